//! Capture → detect → classify workflow.
//!
//! The [`Orchestrator`] owns the transient state of one in-progress session
//! and sequences the remote calls. State lives behind a `tokio` mutex that
//! is never held while a backend call is in flight; every call remembers
//! the [`SessionTag`] it was issued under and its response is dropped with
//! [`LofuError::Superseded`] if the session was discarded in the meantime.
//!
//! ```text
//! Idle ──start_capture/upload──▶ Captured ──detect──▶ Detected ──classify──▶ Classifying ──▶ Classified
//!   ▲                                │  ▲                 │  ▲                      │
//!   └──────────── discard/reset ─────┘  └─ no detections ─┘  └──── failure ─────────┘
//! ```

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::backend::{ArchBackend, Report, ReportRequest};
use crate::camera::{Camera, CameraLease};
use crate::classification::ClassificationResult;
use crate::codec::EncodedImage;
use crate::config::PipelineConfig;
use crate::detection::{Detection, NormalizedDetections, ResponseShape};
use crate::error::{LofuError, Result};
use crate::overlay::{render_overlay, Overlay, OverlayStyle, Region};
use crate::persistence::{PersistenceAdapter, SessionRecorder};
use crate::ranker::{rank_owned, Crop, RankPolicy, RankedSelection};
use crate::session::{Capture, CaptureOrigin, SessionTag};
use crate::store::CaptureId;

/// Workflow phase of the active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Captured,
    Detected,
    Classifying,
    Classified,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Captured => "captured",
            Self::Detected => "detected",
            Self::Classifying => "classifying",
            Self::Classified => "classified",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ranked selection, overlay and crops of one detect call.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSummary {
    pub shape: ResponseShape,
    pub selection: RankedSelection,
    /// Detections drawn on the overlay.
    pub overlay_boxes: Vec<Detection>,
    pub overlay: Option<Overlay>,
    pub crops: Vec<Crop>,
}

/// Result of [`Orchestrator::detect`]. Empty results are outcomes, not
/// errors.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectOutcome {
    /// Nothing found; the session stays captured.
    NoDetections,
    /// Only non-foot objects were found. The overlay is drawn but there is
    /// nothing to classify.
    OnlyUnknownObjects(DetectionSummary),
    Detected(DetectionSummary),
}

impl DetectOutcome {
    pub fn summary(&self) -> Option<&DetectionSummary> {
        match self {
            Self::NoDetections => None,
            Self::OnlyUnknownObjects(summary) | Self::Detected(summary) => Some(summary),
        }
    }
}

/// One classified crop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedCrop {
    pub crop: Crop,
    pub result: ClassificationResult,
}

/// Hand-off to the report view: the capture and its (crop, result) pairs in
/// selection order.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedSession {
    pub tag: SessionTag,
    pub capture: Capture,
    pub rows: Vec<ClassifiedCrop>,
}

/// Read-only copy of the session state.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub tag: SessionTag,
    pub phase: Phase,
    pub capture: Option<Capture>,
    pub detection: Option<DetectionSummary>,
    pub results: Vec<ClassificationResult>,
    pub camera_streaming: bool,
}

struct Session {
    tag: SessionTag,
    phase: Phase,
    capture: Option<Capture>,
    detection: Option<DetectionSummary>,
    results: Vec<ClassificationResult>,
    recorder: Option<SessionRecorder>,
    lease: Option<CameraLease>,
}

impl Session {
    fn new() -> Self {
        Self {
            tag: SessionTag::new(),
            phase: Phase::Idle,
            capture: None,
            detection: None,
            results: Vec::new(),
            recorder: None,
            lease: None,
        }
    }

    fn ensure_not_busy(&self) -> Result<()> {
        if self.phase == Phase::Classifying {
            Err(LofuError::Busy)
        } else {
            Ok(())
        }
    }

    /// Start a new session around `capture`, releasing the camera.
    fn begin(&mut self, capture: Capture, persistence: Option<&PersistenceAdapter>) {
        self.lease = None;
        self.tag = capture.tag;
        self.phase = Phase::Captured;
        self.detection = None;
        self.results.clear();
        self.recorder = persistence.map(|p| SessionRecorder::start(p.clone(), capture.clone()));
        self.capture = Some(capture);
    }

    fn clear(&mut self) {
        self.tag = SessionTag::new();
        self.phase = Phase::Idle;
        self.capture = None;
        self.detection = None;
        self.results.clear();
        self.recorder = None;
        self.lease = None;
    }
}

/// Puts a session back into its pre-classify phase if the batch ends
/// without committing, including when the classify future is dropped.
struct ClassifyGuard {
    state: Arc<Mutex<Session>>,
    tag: SessionTag,
    prior: Phase,
    armed: bool,
}

impl ClassifyGuard {
    fn restore(session: &mut Session, tag: SessionTag, prior: Phase) {
        if session.tag == tag && session.phase == Phase::Classifying {
            session.phase = prior;
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ClassifyGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let (tag, prior) = (self.tag, self.prior);
        if let Ok(mut session) = self.state.try_lock() {
            Self::restore(&mut session, tag, prior);
            return;
        }
        // Contended: finish on the runtime once the holder lets go.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let state = self.state.clone();
                handle.spawn(async move {
                    Self::restore(&mut *state.lock().await, tag, prior);
                });
            }
            Err(_) => warn!(session = %tag, "Classify cancelled outside a runtime; phase not restored"),
        }
    }
}

/// Sequences capture, detection and classification for one user.
pub struct Orchestrator {
    config: PipelineConfig,
    backend: Arc<dyn ArchBackend>,
    camera: Option<Arc<dyn Camera>>,
    persistence: Option<PersistenceAdapter>,
    style: OverlayStyle,
    state: Arc<Mutex<Session>>,
}

impl Orchestrator {
    pub fn new(config: PipelineConfig, backend: Arc<dyn ArchBackend>) -> Self {
        Self {
            config,
            backend,
            camera: None,
            persistence: None,
            style: OverlayStyle::default(),
            state: Arc::new(Mutex::new(Session::new())),
        }
    }

    pub fn with_camera(mut self, camera: Arc<dyn Camera>) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn with_persistence(mut self, persistence: PersistenceAdapter) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn with_style(mut self, style: OverlayStyle) -> Self {
        self.style = style;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Acquire the camera stream. A stream that is already running is kept.
    pub async fn start_camera(&self) -> Result<()> {
        let camera = self
            .camera
            .clone()
            .ok_or_else(|| LofuError::CameraUnavailable("no camera attached".into()))?;

        let mut session = self.state.lock().await;
        if session.phase != Phase::Idle {
            return Err(LofuError::InvalidState {
                operation: "start the camera",
                state: session.phase.as_str(),
            });
        }
        if session.lease.is_none() {
            session.lease = Some(CameraLease::acquire(camera).await?);
            info!("Camera preview started");
        }
        Ok(())
    }

    pub async fn stop_camera(&self) {
        if self.state.lock().await.lease.take().is_some() {
            info!("Camera preview stopped");
        }
    }

    /// Snapshot the current frame into a new capture and stop the camera.
    #[instrument(skip(self))]
    pub async fn start_capture(&self) -> Result<Capture> {
        let mut session = self.state.lock().await;
        session.ensure_not_busy()?;

        let lease = session
            .lease
            .as_ref()
            .ok_or_else(|| LofuError::CameraUnavailable("camera stream is not running".into()))?;
        let frame = lease.frame().await?;
        if !frame.is_ready() {
            warn!("Capture requested before the stream reported its size");
            return Err(LofuError::CameraNotReady);
        }

        let capture = Capture::new(frame.image, CaptureOrigin::Camera, frame.width, frame.height);
        session.begin(capture.clone(), self.persistence.as_ref());
        info!(session = %capture.tag, width = capture.width, height = capture.height, "Captured frame");
        Ok(capture)
    }

    /// Start a session from an uploaded image instead of the camera.
    #[instrument(skip(self, image), fields(bytes = image.bytes.len()))]
    pub async fn upload(&self, image: EncodedImage) -> Result<Capture> {
        let (width, height) = image.dimensions()?;

        let mut session = self.state.lock().await;
        session.ensure_not_busy()?;

        let capture = Capture::new(image, CaptureOrigin::Upload, width, height);
        session.begin(capture.clone(), self.persistence.as_ref());
        info!(session = %capture.tag, width, height, "Uploaded image");
        Ok(capture)
    }

    /// Run detection on the current capture.
    #[instrument(skip(self))]
    pub async fn detect(&self) -> Result<DetectOutcome> {
        let (tag, capture) = {
            let session = self.state.lock().await;
            session.ensure_not_busy()?;
            let capture = session.capture.clone().ok_or(LofuError::InvalidState {
                operation: "detect",
                state: session.phase.as_str(),
            })?;
            (session.tag, capture)
        };

        let response = self.backend.detect(&capture.image).await;

        let mut session = self.state.lock().await;
        if session.tag != tag {
            info!(session = %tag, "Dropping detect response for a discarded session");
            return Err(LofuError::Superseded);
        }
        session.ensure_not_busy()?;

        let normalized = response?.normalize();
        if normalized.is_empty() {
            info!(shape = ?normalized.shape, "No detections");
            session.detection = None;
            session.results.clear();
            session.phase = Phase::Captured;
            return Ok(DetectOutcome::NoDetections);
        }

        let summary = analyze(&capture.image, normalized, self.config.rank_policy, &self.style)?;
        info!(
            selected = summary.selection.len(),
            crops = summary.crops.len(),
            drawn = summary.overlay_boxes.len(),
            "Detection complete"
        );

        if let Some(recorder) = &session.recorder {
            if !summary.crops.is_empty() {
                recorder.record_crops(summary.crops.clone());
            }
        }
        session.detection = Some(summary.clone());
        session.results.clear();
        session.phase = Phase::Detected;

        if summary.selection.is_empty() {
            Ok(DetectOutcome::OnlyUnknownObjects(summary))
        } else {
            Ok(DetectOutcome::Detected(summary))
        }
    }

    /// Classify every crop of the current selection, one call at a time.
    ///
    /// Any failure aborts the batch: nothing is committed and the session
    /// returns to the phase it was in.
    #[instrument(skip(self))]
    pub async fn classify(&self) -> Result<ClassifiedSession> {
        let (tag, prior, capture, crops) = {
            let mut session = self.state.lock().await;
            session.ensure_not_busy()?;
            let crops = session
                .detection
                .as_ref()
                .map(|d| d.crops.clone())
                .unwrap_or_default();
            if crops.is_empty() {
                return Err(LofuError::NoImages);
            }
            let capture = session.capture.clone().ok_or(LofuError::NoImages)?;
            let prior = session.phase;
            session.phase = Phase::Classifying;
            (session.tag, prior, capture, crops)
        };

        let mut guard = ClassifyGuard {
            state: self.state.clone(),
            tag,
            prior,
            armed: true,
        };

        let mut results = Vec::with_capacity(crops.len());
        for crop in &crops {
            match self.backend.classify(&crop.image).await {
                Ok(result) => {
                    debug!(crop = %crop.id(), prediction = %result.prediction, "Classified crop");
                    results.push(result);
                }
                Err(e) => {
                    warn!(crop = %crop.id(), error = %e, "Classification failed, aborting batch");
                    let mut session = self.state.lock().await;
                    ClassifyGuard::restore(&mut session, tag, prior);
                    guard.disarm();
                    return Err(if session.tag == tag { e } else { LofuError::Superseded });
                }
            }
        }

        let mut session = self.state.lock().await;
        guard.disarm();
        if session.tag != tag {
            info!(session = %tag, "Dropping classification for a discarded session");
            return Err(LofuError::Superseded);
        }

        session.results = results.clone();
        session.phase = Phase::Classified;
        if let Some(recorder) = &session.recorder {
            recorder.record_classification(results.clone());
        }
        info!(rows = results.len(), "Classification complete");

        let rows = crops
            .into_iter()
            .zip(results)
            .map(|(crop, result)| ClassifiedCrop { crop, result })
            .collect();
        Ok(ClassifiedSession { tag, capture, rows })
    }

    /// Ask the backend for the report of classified row `index`.
    #[instrument(skip(self))]
    pub async fn report(&self, index: usize) -> Result<Report> {
        let (tag, request) = {
            let session = self.state.lock().await;
            if session.phase != Phase::Classified {
                return Err(LofuError::InvalidState {
                    operation: "request a report",
                    state: session.phase.as_str(),
                });
            }
            let (Some(capture), Some(result)) = (session.capture.as_ref(), session.results.get(index)) else {
                return Err(LofuError::InvalidState {
                    operation: "request a report",
                    state: "no classified row at that index",
                });
            };
            let request = ReportRequest::new(capture.report_image_name(index), result.prediction);
            (session.tag, request)
        };

        let report = self.backend.report(&request).await;
        if self.state.lock().await.tag != tag {
            return Err(LofuError::Superseded);
        }
        report
    }

    /// Drop the session and go back to previewing.
    pub async fn discard(&self) -> Result<()> {
        {
            let mut session = self.state.lock().await;
            debug!(session = %session.tag, phase = %session.phase, "Discarding session");
            session.clear();
        }
        if self.camera.is_some() {
            self.start_camera().await?;
        }
        Ok(())
    }

    /// Same as [`discard`](Self::discard); used once a session is finished.
    pub async fn reset(&self) -> Result<()> {
        self.discard().await
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let session = self.state.lock().await;
        SessionSnapshot {
            tag: session.tag,
            phase: session.phase,
            capture: session.capture.clone(),
            detection: session.detection.clone(),
            results: session.results.clone(),
            camera_streaming: session.lease.is_some(),
        }
    }

    /// Wait for queued persistence writes of the current session.
    pub async fn flush_persistence(&self) -> Option<CaptureId> {
        let recorder = self.state.lock().await.recorder.clone()?;
        recorder.flush().await
    }
}

/// Rank the primary detections, draw the overlay and extract the crops.
///
/// A flat response draws the ranked selection; a split response draws every
/// box it carries.
pub(crate) fn analyze(
    image: &EncodedImage,
    normalized: NormalizedDetections,
    policy: RankPolicy,
    style: &OverlayStyle,
) -> Result<DetectionSummary> {
    let NormalizedDetections {
        overlay_boxes,
        primary,
        shape,
    } = normalized;

    let selection = rank_owned(primary, policy);
    let overlay_boxes = match shape {
        ResponseShape::Split => overlay_boxes,
        ResponseShape::Flat | ResponseShape::Invalid => selection.as_slice().to_vec(),
    };

    let overlay = if overlay_boxes.is_empty() {
        None
    } else {
        let regions = overlay_regions(&overlay_boxes, policy);
        Some(render_overlay(image, &regions, style)?)
    };
    let crops = selection.crops();

    Ok(DetectionSummary {
        shape,
        selection,
        overlay_boxes,
        overlay,
        crops,
    })
}

/// Regions for the overlay. Under a `label_unknown` policy a box without a
/// side is labeled `Unknown` whatever its class.
fn overlay_regions(boxes: &[Detection], policy: RankPolicy) -> Vec<Region> {
    boxes
        .iter()
        .map(|det| {
            let mut region = Region::from_detection(det);
            if policy.label_unknown {
                region.label = Some(det.side_or_unknown().to_string());
            }
            region
        })
        .collect()
}
