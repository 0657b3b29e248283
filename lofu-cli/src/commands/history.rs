//! History command implementations.

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::info;

use lofu_core::store::{CaptureRecord, Page};
use lofu_core::CaptureId;

use crate::utils;
use crate::GlobalArgs;

/// List stored captures, newest first.
pub async fn list(global: &GlobalArgs, limit: Option<usize>, cursor: Option<String>) -> Result<()> {
    let config = utils::build_config(global)?;
    let persistence = utils::require_persistence(&config)?;
    let page_size = utils::history_page_size(limit);

    let page = persistence
        .list(page_size, cursor.as_deref())
        .await
        .context("Failed to list captures")?;
    info!(count = page.items.len(), more = page.next_cursor.is_some(), "Listed captures");

    if global.json {
        return utils::print_json(&page);
    }
    if !global.quiet {
        print_page(&page);
    }
    Ok(())
}

/// Delete one stored capture with its objects.
pub async fn delete(global: &GlobalArgs, id: String) -> Result<()> {
    let config = utils::build_config(global)?;
    let persistence = utils::require_persistence(&config)?;
    let id = CaptureId::new(id);

    persistence
        .delete(&id)
        .await
        .with_context(|| format!("Failed to delete capture {id}"))?;

    if global.json {
        return utils::print_json(&serde_json::json!({ "deleted": id }));
    }
    if !global.quiet {
        println!("{} {}", "Deleted".green().bold(), id);
    }
    Ok(())
}

fn print_page(page: &Page<CaptureRecord>) {
    if page.items.is_empty() {
        println!("{}", "No stored captures.".yellow());
        return;
    }

    println!();
    for record in &page.items {
        print_record(record);
    }

    if let Some(cursor) = &page.next_cursor {
        println!("{} --cursor {}", "More:".dimmed(), cursor);
    }
}

fn print_record(record: &CaptureRecord) {
    println!(
        "{}  {}",
        record.id.as_str().bold(),
        utils::format_timestamp(&record.created_at).dimmed()
    );
    println!("   {} {}", "Crops:".dimmed(), record.crops.len());
    for result in &record.classification {
        println!(
            "   {} {} ({})",
            "Result:".dimmed(),
            result.prediction.display_label(),
            utils::format_confidence(result.confidence)
        );
    }

    let urls = record.urls();
    for (name, url) in [("Capture:", urls.capture), ("Left:", urls.left), ("Right:", urls.right)] {
        if let Some(url) = url {
            println!("   {} {}", name.dimmed(), url);
        }
    }
    println!();
}
