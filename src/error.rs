//! Failure taxonomy for the capture-and-submit flow.

use serde_json::Value;

/// Errors surfaced by the booth capabilities. All of them are caught by the
/// controller and turned into a status message; none end the session.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BoothError {
    /// Permission denied, no device, or device already in use.
    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),

    /// The frame could not be rendered or encoded (e.g. stream already stopped).
    #[error("Capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// The request could not be sent or the response could not be received.
    #[error("Network error: {0}")]
    Network(String),

    /// The relay answered with a non-2xx status.
    #[error("Backend error ({status}): {}", message.as_deref().unwrap_or("no description"))]
    Backend {
        status: u16,
        message: Option<String>,
        details: Option<Value>,
    },

    /// 2xx response whose body is unusable.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

pub type BoothResult<T> = Result<T, BoothError>;

impl BoothError {
    pub fn camera(msg: impl Into<String>) -> Self {
        Self::CameraUnavailable(msg.into())
    }

    pub fn capture(msg: impl Into<String>) -> Self {
        Self::CaptureUnavailable(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    /// Text shown to the user in place of the raw error.
    pub fn user_message(&self) -> String {
        match self {
            BoothError::CameraUnavailable(_) => {
                "Failed to access camera. Please check permissions.".to_string()
            }
            BoothError::CaptureUnavailable(_) => "Failed to capture photo. Try again.".to_string(),
            BoothError::Network(_) | BoothError::MalformedResponse(_) => {
                "Failed to generate certificate".to_string()
            }
            BoothError::Backend { message, .. } => {
                format!("Error: {}", message.as_deref().unwrap_or("Failed to process"))
            }
        }
    }

    /// Whether the user can retry the failed action without recapturing.
    pub fn is_submission_error(&self) -> bool {
        matches!(
            self,
            BoothError::Network(_) | BoothError::Backend { .. } | BoothError::MalformedResponse(_)
        )
    }
}
