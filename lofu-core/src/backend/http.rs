//! HTTP client for the detect / classify / report endpoints.
//!
//! Every call is a single JSON POST. There is no retry layer: a failed call
//! surfaces immediately and the user repeats the action.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use super::{ArchBackend, Report, ReportRequest};
use crate::classification::{ClassificationResult, ClassifyResponse};
use crate::codec::EncodedImage;
use crate::config::{join_url, PipelineConfig};
use crate::detection::DetectResponse;
use crate::error::{LofuError, Result};

const DETECT_PATH: &str = "detect";
const CLASSIFY_PATH: &str = "classify";
const REPORT_PATH: &str = "report";

/// Backend reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    /// Build a client with the configured per-request timeout.
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LofuError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self::with_client(client, &config.backend_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json<B>(&self, path: &str, body: &B) -> Result<Value>
    where
        B: Serialize + ?Sized,
    {
        let url = join_url(&self.base_url, path);
        let start = Instant::now();

        let response = self.client.post(&url).json(body).send().await.map_err(|e| {
            warn!(
                endpoint = path,
                error = %e,
                latency_ms = start.elapsed().as_millis() as u64,
                "Request failed"
            );
            LofuError::HttpError(e)
        })?;

        let status = response.status();
        debug!(endpoint = path, status = %status, "Received HTTP response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(status, &body);
            warn!(
                endpoint = path,
                status = %status,
                latency_ms = start.elapsed().as_millis() as u64,
                "Backend returned an error"
            );
            return Err(LofuError::backend(path, message));
        }

        let value: Value = response.json().await.map_err(|e| {
            warn!(endpoint = path, error = %e, "Failed to parse JSON response");
            LofuError::MalformedResponse(format!("{path}: {e}"))
        })?;

        debug!(
            endpoint = path,
            latency_ms = start.elapsed().as_millis() as u64,
            "Request completed successfully"
        );
        Ok(value)
    }
}

/// Prefer the `{ "error": ... }` message of the body, else the status line.
fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("returned status: {status}"))
}

#[async_trait]
impl ArchBackend for HttpBackend {
    #[instrument(skip_all, fields(bytes = image.bytes.len()))]
    async fn detect(&self, image: &EncodedImage) -> Result<DetectResponse> {
        let value = self
            .post_json(DETECT_PATH, &json!({ "image": image.to_data_url() }))
            .await?;
        DetectResponse::from_value(value)
    }

    #[instrument(skip_all, fields(bytes = image.bytes.len()))]
    async fn classify(&self, image: &EncodedImage) -> Result<ClassificationResult> {
        let value = self
            .post_json(CLASSIFY_PATH, &json!({ "image": image.to_data_url() }))
            .await?;
        let response: ClassifyResponse = serde_json::from_value(value)
            .map_err(|e| LofuError::MalformedResponse(format!("{CLASSIFY_PATH}: {e}")))?;
        ClassificationResult::try_from(response)
    }

    #[instrument(skip_all, fields(image_name = %request.image_name, arch_type = %request.arch_type))]
    async fn report(&self, request: &ReportRequest) -> Result<Report> {
        let value = self.post_json(REPORT_PATH, request).await?;
        if !value.is_object() {
            return Err(LofuError::MalformedResponse(format!(
                "{REPORT_PATH}: expected a JSON object"
            )));
        }
        Ok(Report(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_prefers_body() {
        let msg = error_message(StatusCode::BAD_REQUEST, r#"{"error": "No image provided"}"#);
        assert_eq!(msg, "No image provided");
    }

    #[test]
    fn test_error_message_falls_back_to_status() {
        let msg = error_message(StatusCode::INTERNAL_SERVER_ERROR, "<html>oops</html>");
        assert!(msg.contains("500"));
        let msg = error_message(StatusCode::BAD_GATEWAY, r#"{"error": ""}"#);
        assert!(msg.contains("502"));
    }

    #[test]
    fn test_base_url_is_trimmed() {
        let backend = HttpBackend::with_client(Client::new(), "http://localhost:5000/");
        assert_eq!(backend.base_url(), "http://localhost:5000");
    }
}
