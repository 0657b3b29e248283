//! Detect command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::info;

use lofu_core::orchestrator::DetectOutcome;

use super::{empty_outcome_message, orchestrator, OutcomeView};
use crate::utils;
use crate::GlobalArgs;

/// Execute the detect command.
pub async fn execute(global: &GlobalArgs, image: PathBuf, overlay_path: Option<PathBuf>) -> Result<()> {
    let config = utils::build_config(global)?;
    let source = utils::load_image(&image)?;
    let orchestrator = orchestrator(config)?;

    orchestrator.upload(source).await.context("Failed to load capture")?;
    let outcome = orchestrator.detect().await.context("Detection failed")?;

    if let Some(path) = &overlay_path {
        match outcome.summary().and_then(|s| s.overlay.as_ref()) {
            Some(overlay) => utils::write_image(path, &overlay.image)?,
            None => info!("Nothing detected, no overlay written"),
        }
    }

    if let Some(id) = orchestrator.flush_persistence().await {
        info!(record = %id, "Capture stored");
    }

    if global.json {
        return utils::print_json(&OutcomeView::new(&outcome));
    }
    if !global.quiet {
        print_outcome(&outcome, overlay_path.as_ref());
    }
    Ok(())
}

fn print_outcome(outcome: &DetectOutcome, overlay_path: Option<&PathBuf>) {
    println!();
    if let Some(message) = empty_outcome_message(outcome) {
        println!("{}", message.yellow());
    }
    let Some(summary) = outcome.summary() else {
        return;
    };

    if !summary.selection.is_empty() {
        println!("{}", "Detected feet".green().bold());
        println!();
        for (i, det) in summary.selection.iter().enumerate() {
            println!(
                "   {} {:<8} {} {:.0} px²",
                format!("{}.", i + 1).dimmed(),
                det.side_or_unknown().to_string(),
                "area".dimmed(),
                det.area()
            );
        }
    }
    println!();
    println!("   {} {}", "Boxes drawn:".dimmed(), summary.overlay_boxes.len());
    println!("   {} {}", "Crops ready:".dimmed(), summary.crops.len());
    if let (Some(path), Some(_)) = (overlay_path, &summary.overlay) {
        println!("   {} {}", "Overlay saved:".dimmed(), path.display());
    }
}
