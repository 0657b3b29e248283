//! Captures and the session tags that identify them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::EncodedImage;

/// Identifies one capture session. A new tag is issued on every capture,
/// upload, discard and reset; responses carrying an older tag are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionTag(Uuid);

impl SessionTag {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionTag {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureOrigin {
    Camera,
    Upload,
}

/// One photographed or uploaded source image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capture {
    pub tag: SessionTag,
    pub image: EncodedImage,
    pub origin: CaptureOrigin,
    pub width: u32,
    pub height: u32,
    pub created_at: DateTime<Utc>,
}

impl Capture {
    pub fn new(image: EncodedImage, origin: CaptureOrigin, width: u32, height: u32) -> Self {
        Self {
            tag: SessionTag::new(),
            image,
            origin,
            width,
            height,
            created_at: Utc::now(),
        }
    }

    /// Name under which the backend report refers to row `index`.
    pub fn report_image_name(&self, index: usize) -> String {
        format!("capture_{}_{}.png", self.tag, index + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_unique() {
        assert_ne!(SessionTag::new(), SessionTag::new());
    }

    #[test]
    fn test_report_image_name_is_one_based() {
        let capture = Capture::new(EncodedImage::new(vec![], "image/png"), CaptureOrigin::Upload, 1, 1);
        let name = capture.report_image_name(0);
        assert!(name.starts_with("capture_"));
        assert!(name.ends_with("_1.png"));
        assert!(!name.contains('-'));
    }
}
