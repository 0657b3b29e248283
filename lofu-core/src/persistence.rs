//! Best-effort persistence of capture sessions.
//!
//! Session writes never fail the pipeline: [`PersistenceAdapter`] returns
//! [`BestEffort`] values, which log their failure and can only be turned
//! into an `Option`. History reads (`list`, `delete`) are ordinary fallible
//! calls.
//!
//! [`SessionRecorder`] runs the writes of one session in order on a
//! background task, so the record id produced by `create_record` is
//! available to the later crop and classification writes without the
//! orchestrator waiting on the store.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::classification::ClassificationResult;
use crate::error::{LofuError, Result};
use crate::ranker::Crop;
use crate::session::Capture;
use crate::store::{CaptureId, CaptureRecord, CaptureStore, NewRecord, Page, RecordPatch, StoredObject};

/// Outcome of a write whose failure must not interrupt the user.
#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub struct BestEffort<T>(Option<T>);

impl<T> BestEffort<T> {
    fn from_result(operation: &'static str, result: Result<T>) -> Self {
        match result {
            Ok(value) => Self(Some(value)),
            Err(e) => {
                warn!(operation, error = %e, "Persistence failed, continuing without it");
                Self(None)
            }
        }
    }

    fn skipped(operation: &'static str) -> Self {
        debug!(operation, "No capture record, skipping persistence");
        Self(None)
    }

    pub fn into_option(self) -> Option<T> {
        self.0
    }

    pub fn is_done(&self) -> bool {
        self.0.is_some()
    }
}

/// Store plus the user whose history it writes to.
#[derive(Clone)]
pub struct PersistenceAdapter {
    store: Arc<dyn CaptureStore>,
    uid: String,
}

impl std::fmt::Debug for PersistenceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceAdapter").field("uid", &self.uid).finish()
    }
}

impl PersistenceAdapter {
    pub fn new(store: Arc<dyn CaptureStore>, uid: impl Into<String>) -> Self {
        Self {
            store,
            uid: uid.into(),
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Create the record and upload the original image.
    ///
    /// The id is returned even when only the upload failed, so later writes
    /// still land on the record.
    pub async fn create_record(&self, capture: &Capture) -> BestEffort<CaptureId> {
        let new = NewRecord {
            session: capture.tag,
            origin: capture.origin,
            created_at: capture.created_at,
        };
        let id = match self.store.create_record(&self.uid, &new).await {
            Ok(id) => id,
            Err(e) => return BestEffort::from_result("create record", Err(e)),
        };
        info!(record = %id, session = %capture.tag, "Capture record created");

        let name = format!("original.{}", capture.image.extension());
        let uploaded = async {
            let original = self.store.put_object(&self.uid, &id, &name, &capture.image).await?;
            let patch = RecordPatch {
                original: Some(original),
                ..Default::default()
            };
            self.store.update_record(&self.uid, &id, &patch).await
        }
        .await;
        let _ = BestEffort::from_result("upload original", uploaded);

        BestEffort(Some(id))
    }

    /// Upload the crops and attach them to the record.
    pub async fn append_crops(&self, id: Option<&CaptureId>, crops: &[Crop]) -> BestEffort<Vec<StoredObject>> {
        let Some(id) = id else {
            return BestEffort::skipped("append crops");
        };
        let result = async {
            let mut stored = Vec::with_capacity(crops.len());
            for (position, crop) in crops.iter().enumerate() {
                let object = self
                    .store
                    .put_object(&self.uid, id, &crop.object_name_at(position), &crop.image)
                    .await?;
                stored.push(StoredObject::new(position + 1, crop.side, object));
            }
            let patch = RecordPatch {
                crops: Some(stored.clone()),
                ..Default::default()
            };
            self.store.update_record(&self.uid, id, &patch).await?;
            Ok::<_, LofuError>(stored)
        }
        .await;
        BestEffort::from_result("append crops", result)
    }

    pub async fn append_classification(
        &self,
        id: Option<&CaptureId>,
        results: &[ClassificationResult],
    ) -> BestEffort<()> {
        let Some(id) = id else {
            return BestEffort::skipped("append classification");
        };
        let patch = RecordPatch {
            classification: Some(results.to_vec()),
            ..Default::default()
        };
        let result = self.store.update_record(&self.uid, id, &patch).await;
        BestEffort::from_result("append classification", result)
    }

    pub async fn list(&self, page_size: usize, cursor: Option<&str>) -> Result<Page<CaptureRecord>> {
        self.store.list(&self.uid, page_size, cursor).await
    }

    pub async fn delete(&self, id: &CaptureId) -> Result<()> {
        self.store.delete(&self.uid, id).await?;
        info!(record = %id, "Capture record deleted");
        Ok(())
    }
}

enum Job {
    Crops(Vec<Crop>),
    Classification(Vec<ClassificationResult>),
    Flush(oneshot::Sender<Option<CaptureId>>),
}

/// Ordered background writer for one capture session.
///
/// Dropping the last handle closes the queue; jobs already queued still run.
#[derive(Debug, Clone)]
pub struct SessionRecorder {
    jobs: mpsc::UnboundedSender<Job>,
}

impl SessionRecorder {
    /// Spawn the writer and queue the record creation for `capture`.
    pub fn start(adapter: PersistenceAdapter, capture: Capture) -> Self {
        let (jobs, mut rx) = mpsc::unbounded_channel::<Job>();

        tokio::spawn(async move {
            let id = adapter.create_record(&capture).await.into_option();
            while let Some(job) = rx.recv().await {
                match job {
                    Job::Crops(crops) => {
                        let _ = adapter.append_crops(id.as_ref(), &crops).await;
                    }
                    Job::Classification(results) => {
                        let _ = adapter.append_classification(id.as_ref(), &results).await;
                    }
                    Job::Flush(reply) => {
                        let _ = reply.send(id.clone());
                    }
                }
            }
            debug!(session = %capture.tag, "Session recorder finished");
        });

        Self { jobs }
    }

    pub fn record_crops(&self, crops: Vec<Crop>) {
        self.enqueue(Job::Crops(crops));
    }

    pub fn record_classification(&self, results: Vec<ClassificationResult>) {
        self.enqueue(Job::Classification(results));
    }

    /// Wait for every queued write; returns the record id if one was created.
    pub async fn flush(&self) -> Option<CaptureId> {
        let (reply, rx) = oneshot::channel();
        self.enqueue(Job::Flush(reply));
        rx.await.ok().flatten()
    }

    fn enqueue(&self, job: Job) {
        if self.jobs.send(job).is_err() {
            warn!("Session recorder is gone, dropping persistence job");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::EncodedImage;
    use crate::detection::Side;
    use crate::session::CaptureOrigin;
    use crate::store::MemoryStore;

    fn capture() -> Capture {
        Capture::new(EncodedImage::new(vec![9, 9], "image/png"), CaptureOrigin::Camera, 4, 4)
    }

    fn crop(order: usize, side: Side) -> Crop {
        Crop {
            order,
            side,
            image: EncodedImage::new(vec![order as u8], "image/png"),
        }
    }

    #[tokio::test]
    async fn test_create_record_uploads_original() {
        let store = Arc::new(MemoryStore::new());
        let adapter = PersistenceAdapter::new(store.clone(), "u1");

        let id = adapter.create_record(&capture()).await.into_option().unwrap();
        let record = store.record(&id).unwrap();
        let original = record.original.unwrap();
        assert!(original.path.ends_with("/original.png"));
        assert!(store.object(&original.path).is_some());
    }

    #[tokio::test]
    async fn test_appends_without_record_are_skipped() {
        let adapter = PersistenceAdapter::new(Arc::new(MemoryStore::new()), "u1");
        assert!(!adapter.append_crops(None, &[crop(1, Side::Left)]).await.is_done());
        assert!(!adapter.append_classification(None, &[]).await.is_done());
    }

    #[tokio::test]
    async fn test_recorder_writes_in_order() {
        let store = Arc::new(MemoryStore::new());
        let adapter = PersistenceAdapter::new(store.clone(), "u1");
        let recorder = SessionRecorder::start(adapter, capture());

        recorder.record_crops(vec![crop(1, Side::Left), crop(2, Side::Unknown)]);
        recorder.record_classification(vec![ClassificationResult::new(crate::classification::ArchType::Flat)]);
        let id = recorder.flush().await.unwrap();

        let record = store.record(&id).unwrap();
        let names: Vec<&str> = record
            .crops
            .iter()
            .map(|c| c.path.rsplit('/').next().unwrap_or_default())
            .collect();
        assert_eq!(names, vec!["1_Left.png", "image_2.png"]);
        assert_eq!(record.classification.len(), 1);
        assert!(record.urls().left.is_some());
        assert!(record.urls().right.is_none());
    }

    #[tokio::test]
    async fn test_crop_files_are_numbered_by_upload_position() {
        let store = Arc::new(MemoryStore::new());
        let adapter = PersistenceAdapter::new(store.clone(), "u1");
        let id = adapter.create_record(&capture()).await.into_option().unwrap();

        // Selection order 1 had no usable crop.
        let stored = adapter
            .append_crops(Some(&id), &[crop(2, Side::Right), crop(3, Side::Unknown)])
            .await
            .into_option()
            .unwrap();

        let names: Vec<&str> = stored
            .iter()
            .map(|c| c.path.rsplit('/').next().unwrap_or_default())
            .collect();
        assert_eq!(names, vec!["1_Right.png", "image_2.png"]);
        assert_eq!(stored.iter().map(|c| c.index).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(store.record(&id).unwrap().crops, stored);
    }
}
