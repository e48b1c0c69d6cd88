use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::{Map, Value};

use crate::config::RelayConfig;
use crate::encoded::EncodedImage;
use crate::error::{BoothError, BoothResult};

/// Sends one captured image to the relay and returns the produced artifact.
/// One request per call; retrying is the user's decision.
#[async_trait]
pub trait SubmissionClient: Send + Sync {
    async fn submit(&self, image: &EncodedImage) -> BoothResult<EncodedImage>;
}

/// HTTP client for the certificate relay endpoint.
pub struct RelayClient {
    http: Client,
    endpoint: Url,
    config: RelayConfig,
}

impl RelayClient {
    pub fn new(config: &RelayConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .with_context(|| format!("Invalid relay endpoint: {}", config.endpoint))?;
        // No request timeout: a submission completes, fails, or is abandoned by a retake
        let http = Client::builder()
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            endpoint,
            config: config.clone(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn request_body(&self, image: &EncodedImage) -> Value {
        let mut body = Map::new();
        body.insert(
            self.config.image_field.clone(),
            Value::String(image.to_data_uri()),
        );
        Value::Object(body)
    }
}

#[async_trait]
impl SubmissionClient for RelayClient {
    async fn submit(&self, image: &EncodedImage) -> BoothResult<EncodedImage> {
        log::info!("Submitting {} byte image to {}", image.len(), self.endpoint);

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&self.request_body(image))
            .send()
            .await
            .map_err(|e| BoothError::network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| BoothError::network(e.to_string()))?;
        log::debug!("Relay answered {} with {} bytes", status, body.len());

        interpret_response(status, &body, &self.config)
    }
}

/// Turn a relay response into an artifact or a typed failure. The body is
/// untrusted: the artifact field is looked up and decoded before use.
pub fn interpret_response(status: u16, body: &[u8], config: &RelayConfig) -> BoothResult<EncodedImage> {
    if !(200..300).contains(&status) {
        let details: Option<Value> = serde_json::from_slice(body).ok();
        let message = details
            .as_ref()
            .and_then(|v| v.get(&config.error_field))
            .and_then(Value::as_str)
            .map(str::to_string);
        return Err(BoothError::Backend {
            status,
            message,
            details,
        });
    }

    let json: Value = serde_json::from_slice(body)
        .map_err(|e| BoothError::malformed(format!("response is not JSON: {}", e)))?;

    let encoded = find_artifact(&json, &config.artifact_field).ok_or_else(|| {
        BoothError::malformed(format!("response has no '{}' field", config.artifact_field))
    })?;

    let artifact = EncodedImage::from_base64(encoded)
        .map_err(|e| BoothError::malformed(format!("'{}' is not base-64: {}", config.artifact_field, e)))?;
    if artifact.is_empty() {
        return Err(BoothError::malformed(format!("'{}' is empty", config.artifact_field)));
    }
    Ok(artifact)
}

// Relays may wrap the backend payload as {"success": true, "data": {...}}
fn find_artifact<'a>(json: &'a Value, field: &str) -> Option<&'a str> {
    json.get(field)
        .or_else(|| json.get("data").and_then(|data| data.get(field)))
        .and_then(Value::as_str)
}
