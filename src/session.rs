use chrono::{DateTime, Duration, Local};

use crate::encoded::EncodedImage;
use crate::error::BoothError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraState {
    Off,
    Starting,
    On,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    Pending,
    Succeeded,
    Failed,
}

/// Coarse position in the capture flow, derived from the session fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    CameraOn,
    Counting,
    Captured,
    Submitting,
    Result,
}

/// Error shown on top of whatever phase the session is in.
#[derive(Debug, Clone)]
pub struct StatusOverlay {
    pub error: BoothError,
    pub at: DateTime<Local>,
}

/// The single mutable state object for one visit to the booth.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    pub camera_state: CameraState,
    pub countdown_value: Option<u32>,
    pub captured_image: Option<EncodedImage>,
    pub submission_state: SubmissionState,
    pub result_artifact: Option<EncodedImage>,
    pub overlay: Option<StatusOverlay>,
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSession {
    pub fn new() -> Self {
        Self {
            camera_state: CameraState::Off,
            countdown_value: None,
            captured_image: None,
            submission_state: SubmissionState::Idle,
            result_artifact: None,
            overlay: None,
        }
    }

    pub fn phase(&self) -> Phase {
        match self.submission_state {
            SubmissionState::Pending => return Phase::Submitting,
            SubmissionState::Succeeded => return Phase::Result,
            _ => {}
        }
        if self.captured_image.is_some() {
            Phase::Captured
        } else if self.countdown_value.is_some() {
            Phase::Counting
        } else if self.camera_state == CameraState::On {
            Phase::CameraOn
        } else {
            Phase::Idle
        }
    }

    pub fn is_submitting(&self) -> bool {
        self.submission_state == SubmissionState::Pending
    }

    pub fn set_error(&mut self, error: BoothError) {
        self.overlay = Some(StatusOverlay {
            error,
            at: Local::now(),
        });
    }

    pub fn clear_error(&mut self) {
        self.overlay = None;
    }

    pub fn last_error(&self) -> Option<&BoothError> {
        self.overlay.as_ref().map(|o| &o.error)
    }

    /// How long the error overlay has been up at `now`.
    pub fn overlay_shown_for(&self, now: DateTime<Local>) -> Option<Duration> {
        self.overlay.as_ref().map(|o| now - o.at)
    }

    /// Human-readable status for display. Not authoritative.
    pub fn status_message(&self) -> String {
        if let Some(overlay) = &self.overlay {
            return overlay.error.user_message();
        }
        match self.phase() {
            Phase::Idle if self.camera_state == CameraState::Starting => {
                "Starting camera...".to_string()
            }
            Phase::Idle => String::new(),
            Phase::CameraOn => "Strike a pose and press capture!".to_string(),
            Phase::Counting => match self.countdown_value {
                Some(n) => format!("Get ready... {}", n),
                None => String::new(),
            },
            Phase::Captured => "Photo captured! Ready to generate your certificate.".to_string(),
            Phase::Submitting => {
                "Generating your Employee of the Month certificate...".to_string()
            }
            Phase::Result => "Certificate generated successfully! 🎉".to_string(),
        }
    }

    pub fn is_error_message(&self) -> bool {
        self.overlay.is_some()
    }

    /// Check the session's structural invariants.
    pub fn validate(&self) -> Result<(), String> {
        let succeeded = self.submission_state == SubmissionState::Succeeded;
        if self.result_artifact.is_some() != succeeded {
            return Err(format!(
                "result artifact present={} but submission state is {:?}",
                self.result_artifact.is_some(),
                self.submission_state
            ));
        }
        if self.countdown_value.is_some() {
            if self.camera_state != CameraState::On {
                return Err(format!(
                    "countdown running while camera is {:?}",
                    self.camera_state
                ));
            }
            if self.captured_image.is_some() {
                return Err("countdown running after capture".to_string());
            }
        }
        if let Some(n) = self.countdown_value {
            if n == 0 {
                return Err("countdown value must be positive".to_string());
            }
        }
        if self.result_artifact.is_some() && self.captured_image.is_none() {
            return Err("result artifact without the captured image".to_string());
        }
        if self.submission_state != SubmissionState::Idle && self.captured_image.is_none() {
            return Err(format!(
                "submission state {:?} without a captured image",
                self.submission_state
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> EncodedImage {
        EncodedImage::new(vec![1, 2, 3], "image/jpeg")
    }

    #[test]
    fn test_new_session_is_idle() {
        let session = CaptureSession::new();
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.status_message(), "");
        assert!(session.validate().is_ok());
    }

    #[test]
    fn test_phase_derivation() {
        let mut session = CaptureSession::new();
        session.camera_state = CameraState::On;
        assert_eq!(session.phase(), Phase::CameraOn);

        session.countdown_value = Some(2);
        assert_eq!(session.phase(), Phase::Counting);
        assert_eq!(session.status_message(), "Get ready... 2");

        session.countdown_value = None;
        session.camera_state = CameraState::Off;
        session.captured_image = Some(image());
        assert_eq!(session.phase(), Phase::Captured);

        session.submission_state = SubmissionState::Pending;
        assert_eq!(session.phase(), Phase::Submitting);

        session.submission_state = SubmissionState::Failed;
        assert_eq!(session.phase(), Phase::Captured);
    }

    #[test]
    fn test_error_overlay_takes_precedence() {
        let mut session = CaptureSession::new();
        session.camera_state = CameraState::Error;
        session.set_error(BoothError::camera("denied"));
        assert!(session.is_error_message());
        assert_eq!(
            session.status_message(),
            "Failed to access camera. Please check permissions."
        );
        session.clear_error();
        assert!(!session.is_error_message());
    }

    #[test]
    fn test_overlay_age() {
        let mut session = CaptureSession::new();
        assert!(session.overlay_shown_for(Local::now()).is_none());

        session.set_error(BoothError::capture("blank frame"));
        let raised = session.overlay.as_ref().unwrap().at;
        assert_eq!(
            session.overlay_shown_for(raised + Duration::seconds(4)),
            Some(Duration::seconds(4))
        );
    }

    #[test]
    fn test_validate_catches_artifact_without_success() {
        let mut session = CaptureSession::new();
        session.captured_image = Some(image());
        session.result_artifact = Some(image());
        assert!(session.validate().is_err());

        session.submission_state = SubmissionState::Succeeded;
        assert!(session.validate().is_ok());
    }

    #[test]
    fn test_validate_catches_countdown_without_camera() {
        let mut session = CaptureSession::new();
        session.countdown_value = Some(3);
        assert!(session.validate().is_err());
    }
}
