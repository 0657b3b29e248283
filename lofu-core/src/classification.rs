//! Arch classification results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{LofuError, Result};

/// The classification output domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArchType {
    Flat,
    Normal,
    High,
    Unknown,
}

impl ArchType {
    /// Map a backend label onto the closed set; unrecognised labels are
    /// `Unknown`.
    pub fn parse(label: &str) -> Self {
        match label.trim() {
            "Flat" => Self::Flat,
            "Normal" => Self::Normal,
            "High" => Self::High,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flat => "Flat",
            Self::Normal => "Normal",
            Self::High => "High",
            Self::Unknown => "Unknown",
        }
    }

    /// Human-readable label for result views.
    pub fn display_label(&self) -> &'static str {
        match self {
            Self::Flat => "Flat Arch",
            Self::Normal => "Normal Arch",
            Self::High => "High Arch",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for ArchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw body of a successful classify call.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifyResponse {
    pub prediction: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub probabilities: Option<BTreeMap<String, f64>>,
}

/// One classification per selected crop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub prediction: ArchType,
    /// Label exactly as returned by the backend.
    pub raw_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<BTreeMap<String, f64>>,
}

impl ClassificationResult {
    pub fn new(prediction: ArchType) -> Self {
        Self {
            prediction,
            raw_label: prediction.to_string(),
            confidence: None,
            probabilities: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

impl TryFrom<ClassifyResponse> for ClassificationResult {
    type Error = LofuError;

    fn try_from(response: ClassifyResponse) -> Result<Self> {
        let raw_label = response
            .prediction
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| ArchType::Unknown.to_string());

        if let Some(c) = response.confidence {
            if !(0.0..=1.0).contains(&c) {
                return Err(LofuError::MalformedResponse(format!(
                    "confidence {c} outside [0, 1]"
                )));
            }
        }

        Ok(Self {
            prediction: ArchType::parse(&raw_label),
            raw_label,
            confidence: response.confidence,
            probabilities: response.probabilities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(value: serde_json::Value) -> ClassifyResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_arch_type_parse_and_labels() {
        assert_eq!(ArchType::parse("Flat"), ArchType::Flat);
        assert_eq!(ArchType::parse("High"), ArchType::High);
        assert_eq!(ArchType::parse("Cavus"), ArchType::Unknown);
        assert_eq!(ArchType::Normal.display_label(), "Normal Arch");
        assert_eq!(ArchType::Unknown.display_label(), "Unknown");
    }

    #[test]
    fn test_full_response() {
        let result = ClassificationResult::try_from(response(json!({
            "prediction": "Normal",
            "confidence": 0.87,
            "probabilities": {"Flat": 0.05, "Normal": 0.87, "High": 0.08}
        })))
        .unwrap();

        assert_eq!(result.prediction, ArchType::Normal);
        assert_eq!(result.confidence, Some(0.87));
        assert_eq!(result.probabilities.unwrap().len(), 3);
    }

    #[test]
    fn test_missing_prediction_is_unknown() {
        let result = ClassificationResult::try_from(response(json!({}))).unwrap();
        assert_eq!(result.prediction, ArchType::Unknown);
        assert_eq!(result.raw_label, "Unknown");
    }

    #[test]
    fn test_unrecognised_label_is_kept_raw() {
        let result =
            ClassificationResult::try_from(response(json!({"prediction": "Cavus"}))).unwrap();
        assert_eq!(result.prediction, ArchType::Unknown);
        assert_eq!(result.raw_label, "Cavus");
    }

    #[test]
    fn test_out_of_range_confidence_is_malformed() {
        let err = ClassificationResult::try_from(response(json!({
            "prediction": "Flat",
            "confidence": 1.5
        })))
        .unwrap_err();
        assert!(matches!(err, LofuError::MalformedResponse(_)));
    }
}
