//! Command implementations.

pub mod classify;
pub mod detect;
pub mod history;
pub mod preview;

use anyhow::Result;
use serde::Serialize;

use lofu_core::orchestrator::{DetectOutcome, DetectionSummary};
use lofu_core::{Orchestrator, PipelineConfig};

use crate::utils;

/// Orchestrator wired to the HTTP backend and, when configured, the store.
fn orchestrator(config: PipelineConfig) -> Result<Orchestrator> {
    let backend = utils::backend(&config)?;
    let persistence = utils::persistence(&config)?;
    let orchestrator = Orchestrator::new(config, backend);
    Ok(match persistence {
        Some(persistence) => orchestrator.with_persistence(persistence),
        None => orchestrator,
    })
}

#[derive(Serialize)]
struct DetectionView {
    order: usize,
    side: String,
    area: f64,
    #[serde(rename = "box")]
    bbox: [f64; 4],
}

#[derive(Serialize)]
struct OutcomeView {
    outcome: &'static str,
    detections: Vec<DetectionView>,
    drawn: usize,
    crops: Vec<String>,
}

impl OutcomeView {
    fn new(outcome: &DetectOutcome) -> Self {
        let label = match outcome {
            DetectOutcome::NoDetections => "no_detections",
            DetectOutcome::OnlyUnknownObjects(_) => "only_unknown_objects",
            DetectOutcome::Detected(_) => "detected",
        };
        match outcome.summary() {
            None => Self {
                outcome: label,
                detections: Vec::new(),
                drawn: 0,
                crops: Vec::new(),
            },
            Some(summary) => Self {
                outcome: label,
                detections: detection_views(summary),
                drawn: summary.overlay_boxes.len(),
                crops: summary.crops.iter().map(|c| c.id()).collect(),
            },
        }
    }
}

fn detection_views(summary: &DetectionSummary) -> Vec<DetectionView> {
    summary
        .selection
        .iter()
        .enumerate()
        .map(|(i, d)| DetectionView {
            order: i + 1,
            side: d.side_or_unknown().to_string(),
            area: d.area(),
            bbox: [d.x1, d.y1, d.x2, d.y2],
        })
        .collect()
}

/// User-facing line for outcomes that have nothing to classify.
fn empty_outcome_message(outcome: &DetectOutcome) -> Option<&'static str> {
    match outcome {
        DetectOutcome::NoDetections => Some("No feet detected. Try another photo."),
        DetectOutcome::OnlyUnknownObjects(_) => {
            Some("No left/right feet detected; unknown objects are present in the image.")
        }
        DetectOutcome::Detected(summary) if summary.crops.is_empty() => {
            Some("Feet were detected but the backend returned no cropped images.")
        }
        DetectOutcome::Detected(_) => None,
    }
}
