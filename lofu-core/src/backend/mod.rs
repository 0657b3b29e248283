//! The detection / classification / report backend.
//!
//! The backend is an external collaborator reached over HTTP. The
//! [`ArchBackend`] trait is the seam the orchestrator talks to; the
//! production implementation is [`HttpBackend`].
//!
//! ## Example
//!
//! ```no_run
//! use lofu_core::backend::{ArchBackend, HttpBackend};
//! use lofu_core::codec::EncodedImage;
//! use lofu_core::config::PipelineConfig;
//!
//! # async fn example() -> lofu_core::Result<()> {
//! let backend = HttpBackend::new(&PipelineConfig::from_env())?;
//! let image = EncodedImage::from_bytes(std::fs::read("feet.png").unwrap());
//! let detections = backend.detect(&image).await?.normalize();
//! println!("{} primary detections", detections.primary.len());
//! # Ok(())
//! # }
//! ```

mod http;

pub use http::HttpBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::classification::{ArchType, ClassificationResult};
use crate::codec::EncodedImage;
use crate::detection::DetectResponse;
use crate::error::Result;

/// Remote detector, classifier and report generator.
///
/// Implementations must be thread-safe (`Send + Sync`). No call is retried;
/// every retry is a manual repeat of the user action.
#[async_trait]
pub trait ArchBackend: Send + Sync {
    /// Find feet (and other objects) in a capture.
    async fn detect(&self, image: &EncodedImage) -> Result<DetectResponse>;

    /// Classify the arch type of one cropped foot.
    async fn classify(&self, image: &EncodedImage) -> Result<ClassificationResult>;

    /// Generate the structured report for one classified foot.
    async fn report(&self, request: &ReportRequest) -> Result<Report>;
}

/// Body of the report call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub image_name: String,
    pub arch_type: ArchType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csi: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay: Option<Value>,
}

impl ReportRequest {
    pub fn new(image_name: impl Into<String>, arch_type: ArchType) -> Self {
        Self {
            image_name: image_name.into(),
            arch_type,
            csi: None,
            overlay: None,
        }
    }
}

/// Report payload, kept opaque for the report view with typed accessors for
/// the fields the pipeline reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Report(pub Value);

impl Report {
    pub fn arch_type(&self) -> ArchType {
        self.0
            .get("arch_type")
            .and_then(Value::as_str)
            .map(ArchType::parse)
            .unwrap_or(ArchType::Unknown)
    }

    pub fn csi(&self) -> Option<f64> {
        self.0.get("csi").and_then(Value::as_f64)
    }

    pub fn overlay(&self) -> Option<&Value> {
        self.0.get("overlay").filter(|v| !v.is_null())
    }

    /// Human label, preferring the one computed by the report service.
    pub fn arch_label(&self) -> String {
        self.0
            .get("arch_label")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.arch_type().display_label().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_report_request_serialization() {
        let request = ReportRequest::new("capture_x_1.png", ArchType::Flat);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value, json!({"image_name": "capture_x_1.png", "arch_type": "Flat"}));
    }

    #[test]
    fn test_report_accessors() {
        let report = Report(json!({
            "arch_type": "High",
            "csi": 12.5,
            "overlay": {"lines": []},
            "disclaimer": "Not medical advice"
        }));
        assert_eq!(report.arch_type(), ArchType::High);
        assert_eq!(report.csi(), Some(12.5));
        assert!(report.overlay().is_some());
        assert_eq!(report.arch_label(), "High Arch");

        let sparse = Report(json!({"overlay": null, "arch_label": "Flat Arch (mild)"}));
        assert_eq!(sparse.arch_type(), ArchType::Unknown);
        assert!(sparse.overlay().is_none());
        assert_eq!(sparse.arch_label(), "Flat Arch (mild)");
    }
}
