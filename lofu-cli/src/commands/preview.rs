//! Preview command implementation.
//!
//! Feeds a still image through the live-preview loop as if it were a camera
//! stream, printing one line per processed tick.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;

use lofu_core::{LivePreview, PreviewControl, PreviewFrame, StillCamera};

use crate::utils;
use crate::GlobalArgs;

#[derive(Serialize)]
struct TickView {
    tick: u64,
    width: u32,
    height: u32,
    boxes: usize,
    selected: Vec<String>,
}

impl From<&PreviewFrame> for TickView {
    fn from(frame: &PreviewFrame) -> Self {
        let (boxes, selected) = match &frame.summary {
            Some(summary) => (
                summary.overlay_boxes.len(),
                summary.selection.iter().map(|d| d.side_or_unknown().to_string()).collect(),
            ),
            None => (0, Vec::new()),
        };
        Self {
            tick: frame.tick,
            width: frame.width,
            height: frame.height,
            boxes,
            selected,
        }
    }
}

#[derive(Serialize)]
struct PreviewView {
    ticks: u64,
    frames_with_detections: u64,
    errors: u64,
    frames: Vec<TickView>,
}

/// Execute the preview command.
pub async fn execute(global: &GlobalArgs, image: PathBuf, ticks: u64, interval_ms: Option<u64>) -> Result<()> {
    let config = utils::build_config(global)?;
    let source = utils::load_image(&image)?;
    let camera = StillCamera::from_image(source).context("Failed to load preview image")?;
    let backend = utils::backend(&config)?;

    let mut preview = LivePreview::new(&config, backend, Arc::new(camera));
    if let Some(ms) = interval_ms {
        preview = preview.with_interval(Duration::from_millis(ms.max(1)));
    }

    let json = global.json;
    let quiet = global.quiet;
    let mut frames = Vec::new();

    let stats = preview
        .run(Some(ticks), |frame| {
            let view = TickView::from(&frame);
            if !json && !quiet {
                print_tick(&view);
            }
            frames.push(view);
            PreviewControl::Continue
        })
        .await
        .context("Preview failed")?;

    if json {
        return utils::print_json(&PreviewView {
            ticks: stats.ticks,
            frames_with_detections: stats.frames_with_detections,
            errors: stats.errors,
            frames,
        });
    }
    if !quiet {
        println!();
        println!(
            "   {} {}   {} {}   {} {}",
            "Ticks:".dimmed(),
            stats.ticks,
            "With detections:".dimmed(),
            stats.frames_with_detections,
            "Errors:".dimmed(),
            if stats.errors > 0 {
                stats.errors.to_string().red().to_string()
            } else {
                stats.errors.to_string()
            }
        );
    }
    Ok(())
}

fn print_tick(view: &TickView) {
    let tick = format!("#{:<3}", view.tick).dimmed();
    if view.width == 0 {
        println!("{tick} {}", "stream warming up".yellow());
    } else if view.boxes == 0 {
        println!("{tick} {}x{}  no detections", view.width, view.height);
    } else {
        println!(
            "{tick} {}x{}  {} boxes  selected: {}",
            view.width,
            view.height,
            view.boxes,
            view.selected.join(", ").green()
        );
    }
}
