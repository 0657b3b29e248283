//! Classify command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use lofu_core::orchestrator::ClassifiedSession;
use lofu_core::Report;

use super::{empty_outcome_message, orchestrator, OutcomeView};
use crate::utils;
use crate::GlobalArgs;

#[derive(Serialize)]
struct RowView {
    id: String,
    side: String,
    arch_type: String,
    label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<Value>,
}

#[derive(Serialize)]
struct ClassifyView {
    session: String,
    #[serde(flatten)]
    detection: OutcomeView,
    rows: Vec<RowView>,
}

/// Execute the classify command.
pub async fn execute(
    global: &GlobalArgs,
    image: PathBuf,
    overlay_path: Option<PathBuf>,
    with_report: bool,
) -> Result<()> {
    let config = utils::build_config(global)?;
    let source = utils::load_image(&image)?;
    let orchestrator = orchestrator(config)?;

    let capture = orchestrator.upload(source).await.context("Failed to load capture")?;
    let outcome = orchestrator.detect().await.context("Detection failed")?;

    if let Some(path) = &overlay_path {
        if let Some(overlay) = outcome.summary().and_then(|s| s.overlay.as_ref()) {
            utils::write_image(path, &overlay.image)?;
        }
    }

    // Nothing to classify is an outcome, not a failure.
    if let Some(message) = empty_outcome_message(&outcome) {
        orchestrator.flush_persistence().await;
        if global.json {
            return utils::print_json(&ClassifyView {
                session: capture.tag.to_string(),
                detection: OutcomeView::new(&outcome),
                rows: Vec::new(),
            });
        }
        if !global.quiet {
            println!();
            println!("{}", message.yellow());
        }
        return Ok(());
    }

    let session = orchestrator.classify().await.context("Classification failed")?;

    let mut reports = Vec::with_capacity(session.rows.len());
    if with_report {
        for index in 0..session.rows.len() {
            let report = orchestrator
                .report(index)
                .await
                .with_context(|| format!("Report request failed for foot {}", index + 1))?;
            reports.push(report);
        }
    }

    if let Some(id) = orchestrator.flush_persistence().await {
        info!(record = %id, "Capture stored");
    }

    if global.json {
        return utils::print_json(&ClassifyView {
            session: session.tag.to_string(),
            detection: OutcomeView::new(&outcome),
            rows: row_views(&session, &reports),
        });
    }
    if !global.quiet {
        print_session(&session, &reports, overlay_path.as_ref());
    }
    Ok(())
}

fn row_views(session: &ClassifiedSession, reports: &[Report]) -> Vec<RowView> {
    session
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| RowView {
            id: row.crop.id(),
            side: row.crop.side.to_string(),
            arch_type: row.result.raw_label.clone(),
            label: row.result.prediction.display_label(),
            confidence: row.result.confidence,
            report: reports.get(i).map(|r| r.0.clone()),
        })
        .collect()
}

fn print_session(session: &ClassifiedSession, reports: &[Report], overlay_path: Option<&PathBuf>) {
    println!();
    println!("{}", "Arch classification".green().bold());
    println!();
    for (i, row) in session.rows.iter().enumerate() {
        println!(
            "   {:<10} {:<12} {} {}",
            row.crop.id(),
            row.result.prediction.display_label().bold(),
            "confidence".dimmed(),
            utils::format_confidence(row.result.confidence)
        );
        if let Some(report) = reports.get(i) {
            let csi = report
                .csi()
                .map(|c| format!("{c:.1}"))
                .unwrap_or_else(|| "-".to_string());
            println!("   {:<10} {} {}  {} {}", "", "report".dimmed(), report.arch_label(), "CSI".dimmed(), csi);
        }
    }
    if let Some(path) = overlay_path {
        println!();
        println!("   {} {}", "Overlay saved:".dimmed(), path.display());
    }
}
