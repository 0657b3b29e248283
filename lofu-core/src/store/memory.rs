//! In-process capture store
//!
//! Thread-safe storage for:
//! - Capture records (per user, ordered by insertion)
//! - Uploaded image objects (keyed by object path)

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::{object_path, CaptureId, CaptureRecord, CaptureStore, NewRecord, ObjectRef, Page, RecordPatch};
use crate::codec::EncodedImage;
use crate::error::{LofuError, Result};

/// Record plus its insertion sequence (newest first ordering)
struct RecordEntry {
    seq: u64,
    record: CaptureRecord,
}

/// Thread-safe in-memory store
#[derive(Default)]
pub struct MemoryStore {
    /// Records (id -> entry)
    records: DashMap<CaptureId, RecordEntry>,
    /// Uploaded objects (path -> image)
    objects: DashMap<String, EncodedImage>,
    next_seq: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a record by id
    pub fn record(&self, id: &CaptureId) -> Option<CaptureRecord> {
        self.records.get(id).map(|entry| entry.record.clone())
    }

    /// Get an uploaded object by path
    pub fn object(&self, path: &str) -> Option<EncodedImage> {
        self.objects.get(path).map(|entry| entry.value().clone())
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn owned_entry(&self, uid: &str, id: &CaptureId) -> Result<dashmap::mapref::one::RefMut<'_, CaptureId, RecordEntry>> {
        match self.records.get_mut(id) {
            Some(entry) if entry.record.uid == uid => Ok(entry),
            _ => Err(LofuError::Store(format!("capture {id} not found"))),
        }
    }
}

#[async_trait]
impl CaptureStore for MemoryStore {
    async fn create_record(&self, uid: &str, record: &NewRecord) -> Result<CaptureId> {
        let id = CaptureId::new(Uuid::new_v4().simple().to_string());
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.records.insert(
            id.clone(),
            RecordEntry {
                seq,
                record: CaptureRecord::create(id.clone(), uid, record),
            },
        );
        Ok(id)
    }

    async fn put_object(
        &self,
        uid: &str,
        id: &CaptureId,
        name: &str,
        image: &EncodedImage,
    ) -> Result<ObjectRef> {
        drop(self.owned_entry(uid, id)?);
        let path = object_path(uid, id, name);
        self.objects.insert(path.clone(), image.clone());
        Ok(ObjectRef {
            url: format!("memory://{path}"),
            path,
        })
    }

    async fn update_record(&self, uid: &str, id: &CaptureId, patch: &RecordPatch) -> Result<()> {
        let mut entry = self.owned_entry(uid, id)?;
        entry.record.apply(patch.clone());
        Ok(())
    }

    async fn list(&self, uid: &str, page_size: usize, cursor: Option<&str>) -> Result<Page<CaptureRecord>> {
        let mut owned: Vec<(u64, CaptureRecord)> = self
            .records
            .iter()
            .filter(|entry| entry.record.uid == uid)
            .map(|entry| (entry.seq, entry.record.clone()))
            .collect();
        owned.sort_by(|a, b| b.0.cmp(&a.0));

        let start = match cursor {
            Some(cursor) => {
                owned
                    .iter()
                    .position(|(_, r)| r.id.as_str() == cursor)
                    .ok_or_else(|| LofuError::Store(format!("unknown cursor {cursor}")))?
                    + 1
            }
            None => 0,
        };

        let items: Vec<CaptureRecord> = owned
            .into_iter()
            .skip(start)
            .take(page_size)
            .map(|(_, r)| r)
            .collect();
        let last = items.last().map(|r| r.id.to_string());
        Ok(Page::new(items, page_size, last))
    }

    async fn delete(&self, uid: &str, id: &CaptureId) -> Result<()> {
        drop(self.owned_entry(uid, id)?);
        self.records.remove(id);
        let prefix = object_path(uid, id, "");
        self.objects.retain(|path, _| !path.starts_with(&prefix));
        Ok(())
    }
}
