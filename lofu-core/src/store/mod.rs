//! Remote document + object store for capture history.
//!
//! Records live under `users/{uid}/captures/{id}`; image objects are named
//! `original.png`, `{n}_{Side}.png` or `image_{n}.png` inside the record's
//! folder, `n` counting the uploaded crops. The store is never the source
//! of truth for the running session.

mod http;
mod memory;

pub use http::HttpStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classification::ClassificationResult;
use crate::codec::EncodedImage;
use crate::detection::Side;
use crate::error::Result;
use crate::session::{CaptureOrigin, SessionTag};

/// Record id assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaptureId(String);

impl CaptureId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CaptureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Location of an uploaded object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub path: String,
    pub url: String,
}

/// An uploaded crop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    /// 1-based position in the uploaded batch.
    pub index: usize,
    pub side: Side,
    pub path: String,
    pub url: String,
}

impl StoredObject {
    pub fn new(index: usize, side: Side, object: ObjectRef) -> Self {
        Self {
            index,
            side,
            path: object.path,
            url: object.url,
        }
    }
}

/// Body of a record creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    pub session: SessionTag,
    pub origin: CaptureOrigin,
    pub created_at: DateTime<Utc>,
}

/// Partial update; `None` fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<ObjectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crops: Option<Vec<StoredObject>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<Vec<ClassificationResult>>,
}

/// A persisted capture as returned by the history listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub id: CaptureId,
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<CaptureOrigin>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<ObjectRef>,
    #[serde(default)]
    pub crops: Vec<StoredObject>,
    #[serde(default)]
    pub classification: Vec<ClassificationResult>,
}

/// Convenience links of a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureUrls {
    pub capture: Option<String>,
    pub left: Option<String>,
    pub right: Option<String>,
}

impl CaptureRecord {
    pub(crate) fn create(id: CaptureId, uid: &str, record: &NewRecord) -> Self {
        Self {
            id,
            uid: uid.to_string(),
            session: Some(record.session),
            origin: Some(record.origin),
            created_at: record.created_at,
            updated_at: record.created_at,
            original: None,
            crops: Vec::new(),
            classification: Vec::new(),
        }
    }

    pub(crate) fn apply(&mut self, patch: RecordPatch) {
        if let Some(original) = patch.original {
            self.original = Some(original);
        }
        if let Some(crops) = patch.crops {
            self.crops = crops;
        }
        if let Some(classification) = patch.classification {
            self.classification = classification;
        }
        self.updated_at = Utc::now();
    }

    /// Links to the original and the first left / right crops.
    pub fn urls(&self) -> CaptureUrls {
        let first = |side: Side| {
            self.crops
                .iter()
                .find(|c| c.side == side)
                .map(|c| c.url.clone())
        };
        CaptureUrls {
            capture: self.original.as_ref().map(|o| o.url.clone()),
            left: first(Side::Left),
            right: first(Side::Right),
        }
    }
}

/// One page of the history listing, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Present only when a full page was returned.
    #[serde(default)]
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub(crate) fn new(items: Vec<T>, page_size: usize, last_cursor: Option<String>) -> Self {
        let next_cursor = if page_size > 0 && items.len() == page_size {
            last_cursor
        } else {
            None
        };
        Self { items, next_cursor }
    }
}

/// Document + object store used for capture history.
#[async_trait]
pub trait CaptureStore: Send + Sync {
    async fn create_record(&self, uid: &str, record: &NewRecord) -> Result<CaptureId>;

    /// Upload one image into the record's folder.
    async fn put_object(
        &self,
        uid: &str,
        id: &CaptureId,
        name: &str,
        image: &EncodedImage,
    ) -> Result<ObjectRef>;

    async fn update_record(&self, uid: &str, id: &CaptureId, patch: &RecordPatch) -> Result<()>;

    /// Records of `uid`, newest first, starting after `cursor`.
    async fn list(&self, uid: &str, page_size: usize, cursor: Option<&str>) -> Result<Page<CaptureRecord>>;

    async fn delete(&self, uid: &str, id: &CaptureId) -> Result<()>;
}

/// Object path of `name` inside a record's folder.
pub fn object_path(uid: &str, id: &CaptureId, name: &str) -> String {
    format!("users/{uid}/captures/{id}/{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crop(index: usize, side: Side) -> StoredObject {
        StoredObject::new(
            index,
            side,
            ObjectRef {
                path: format!("p/{index}"),
                url: format!("https://cdn/{index}"),
            },
        )
    }

    #[test]
    fn test_urls_pick_first_crop_per_side() {
        let new = NewRecord {
            session: SessionTag::new(),
            origin: CaptureOrigin::Camera,
            created_at: Utc::now(),
        };
        let mut record = CaptureRecord::create(CaptureId::new("abc"), "u1", &new);
        assert_eq!(record.urls(), CaptureUrls::default());

        record.apply(RecordPatch {
            original: Some(ObjectRef {
                path: "p/0".into(),
                url: "https://cdn/0".into(),
            }),
            crops: Some(vec![crop(1, Side::Right), crop(2, Side::Left), crop(3, Side::Left)]),
            classification: None,
        });

        let urls = record.urls();
        assert_eq!(urls.capture.as_deref(), Some("https://cdn/0"));
        assert_eq!(urls.left.as_deref(), Some("https://cdn/2"));
        assert_eq!(urls.right.as_deref(), Some("https://cdn/1"));
        assert!(record.updated_at >= record.created_at);
    }

    #[test]
    fn test_patch_serialization_skips_unset_fields() {
        let patch = RecordPatch {
            classification: Some(vec![]),
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&patch).unwrap(), r#"{"classification":[]}"#);
    }

    #[test]
    fn test_page_cursor_only_on_full_page() {
        let full = Page::new(vec![1, 2], 2, Some("b".to_string()));
        assert_eq!(full.next_cursor.as_deref(), Some("b"));
        let partial = Page::new(vec![1], 2, Some("a".to_string()));
        assert!(partial.next_cursor.is_none());
    }

    #[test]
    fn test_object_path() {
        let id = CaptureId::new("r1");
        assert_eq!(object_path("u", &id, "1_Left.png"), "users/u/captures/r1/1_Left.png");
    }
}
