//! Lofu Core - foot-arch capture, detection and classification pipeline
//!
//! This crate turns a photograph of a pair of feet into ranked, cropped
//! foot images, an annotated overlay and one arch-type classification per
//! foot, using a remote detect/classify/report backend.
//!
//! # Features
//!
//! - Deterministic ranking of detections (Left, Right, then unlabeled by area)
//! - Overlay rendering at the source image's intrinsic resolution
//! - Sequential per-crop classification with all-or-nothing commit
//! - Best-effort mirroring of sessions to a document + object store
//! - Stale responses of discarded sessions are dropped
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lofu_core::{DetectOutcome, EncodedImage, HttpBackend, Orchestrator, PipelineConfig};
//!
//! # async fn example() -> lofu_core::Result<()> {
//! let config = PipelineConfig::from_env();
//! let backend = Arc::new(HttpBackend::new(&config)?);
//! let orchestrator = Orchestrator::new(config, backend);
//!
//! orchestrator
//!     .upload(EncodedImage::from_bytes(std::fs::read("feet.jpg").unwrap()))
//!     .await?;
//!
//! if let DetectOutcome::Detected(_) = orchestrator.detect().await? {
//!     let session = orchestrator.classify().await?;
//!     for row in &session.rows {
//!         println!("{}: {}", row.crop.id(), row.result.prediction.display_label());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod classification;
pub mod codec;
pub mod config;
pub mod detection;
pub mod error;
pub mod ranker;

#[cfg(feature = "overlay")]
pub mod overlay;

#[cfg(feature = "network")]
pub mod backend;
#[cfg(feature = "network")]
pub mod persistence;
#[cfg(feature = "network")]
pub mod session;
#[cfg(feature = "network")]
pub mod store;

#[cfg(feature = "pipeline")]
pub mod camera;
#[cfg(feature = "pipeline")]
pub mod orchestrator;
#[cfg(feature = "pipeline")]
pub mod preview;

// Re-export main types for convenience
pub use classification::{ArchType, ClassificationResult};
pub use codec::EncodedImage;
pub use config::PipelineConfig;
pub use detection::{BoundingBox, DetectResponse, Detection, NormalizedDetections, Side};
pub use error::{LofuError, Result};
pub use ranker::{rank, Crop, RankPolicy, RankedSelection};

#[cfg(feature = "overlay")]
pub use overlay::{render_detections, render_overlay, Overlay, OverlayStyle, Region};

// Network-dependent exports (not available in Wasm)
#[cfg(feature = "network")]
pub use backend::{ArchBackend, HttpBackend, Report, ReportRequest};
#[cfg(feature = "network")]
pub use persistence::{BestEffort, PersistenceAdapter};
#[cfg(feature = "network")]
pub use session::{Capture, CaptureOrigin, SessionTag};
#[cfg(feature = "network")]
pub use store::{CaptureId, CaptureRecord, CaptureStore, HttpStore, MemoryStore};

#[cfg(feature = "pipeline")]
pub use camera::{Camera, CameraLease, StillCamera};
#[cfg(feature = "pipeline")]
pub use orchestrator::{ClassifiedSession, DetectOutcome, Orchestrator, Phase};
#[cfg(feature = "pipeline")]
pub use preview::{LivePreview, PreviewControl, PreviewFrame};
