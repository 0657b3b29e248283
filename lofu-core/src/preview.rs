//! Live detection preview.
//!
//! Runs detection on the current camera frame at a fixed interval and hands
//! each annotated frame to a caller-provided sink. Ticks are processed one
//! after another; ticks missed while a request is in flight are skipped.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::backend::ArchBackend;
use crate::camera::{Camera, CameraLease};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::orchestrator::{analyze, DetectionSummary};
use crate::overlay::OverlayStyle;
use crate::ranker::RankPolicy;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// One processed preview tick.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewFrame {
    /// 1-based tick number.
    pub tick: u64,
    pub width: u32,
    pub height: u32,
    /// `None` while the stream is warming up or when nothing was found.
    pub summary: Option<DetectionSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewControl {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreviewStats {
    pub ticks: u64,
    pub frames_with_detections: u64,
    pub errors: u64,
}

pub struct LivePreview {
    backend: Arc<dyn ArchBackend>,
    camera: Arc<dyn Camera>,
    interval: Duration,
    style: OverlayStyle,
}

impl LivePreview {
    pub fn new(config: &PipelineConfig, backend: Arc<dyn ArchBackend>, camera: Arc<dyn Camera>) -> Self {
        Self {
            backend,
            camera,
            interval: config.preview_interval,
            style: OverlayStyle::default(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Detect on the lease's current frame. The preview always ranks with
    /// the capture policy.
    pub async fn tick(&self, lease: &CameraLease, tick: u64) -> Result<PreviewFrame> {
        let frame = lease.frame().await?;
        if !frame.is_ready() {
            debug!(tick, "Stream not ready, skipping detection");
            return Ok(PreviewFrame {
                tick,
                width: 0,
                height: 0,
                summary: None,
            });
        }

        let normalized = self.backend.detect(&frame.image).await?.normalize();
        let summary = if normalized.is_empty() {
            None
        } else {
            Some(analyze(&frame.image, normalized, RankPolicy::capture(), &self.style)?)
        };

        Ok(PreviewFrame {
            tick,
            width: frame.width,
            height: frame.height,
            summary,
        })
    }

    /// Run until `max_ticks` ticks were processed or the sink returns
    /// [`PreviewControl::Stop`]. Tick errors are logged and counted.
    pub async fn run<F>(&self, max_ticks: Option<u64>, mut sink: F) -> Result<PreviewStats>
    where
        F: FnMut(PreviewFrame) -> PreviewControl,
    {
        let lease = CameraLease::acquire(self.camera.clone()).await?;
        let mut interval = tokio::time::interval(self.interval.max(MIN_INTERVAL));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut stats = PreviewStats::default();
        info!(interval_ms = self.interval.as_millis() as u64, "Live preview started");

        while max_ticks.map_or(true, |max| stats.ticks < max) {
            interval.tick().await;
            stats.ticks += 1;

            match self.tick(&lease, stats.ticks).await {
                Ok(frame) => {
                    if frame.summary.is_some() {
                        stats.frames_with_detections += 1;
                    }
                    if sink(frame) == PreviewControl::Stop {
                        break;
                    }
                }
                Err(e) => {
                    stats.errors += 1;
                    warn!(tick = stats.ticks, error = %e, "Preview detection failed");
                }
            }
        }

        info!(
            ticks = stats.ticks,
            detected = stats.frames_with_detections,
            errors = stats.errors,
            "Live preview stopped"
        );
        Ok(stats)
    }
}
