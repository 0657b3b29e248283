//! Common utility functions shared across CLI commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use lofu_core::config::DEFAULT_HISTORY_PAGE_SIZE;
use lofu_core::{EncodedImage, HttpBackend, HttpStore, LofuError, PersistenceAdapter, PipelineConfig, RankPolicy};

use crate::GlobalArgs;

/// Environment configuration with command-line overrides applied.
pub fn build_config(global: &GlobalArgs) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::from_env();
    if let Some(url) = &global.backend_url {
        config.backend_url = url.clone();
    }
    if let Some(url) = &global.store_url {
        config.store_url = Some(url.clone());
    }
    if let Some(user) = &global.user {
        config.user_id = Some(user.clone());
    }
    if global.review {
        config.rank_policy = RankPolicy::review();
    }
    config.validate()?;
    debug!(backend = %config.backend_url, cap = config.rank_policy.cap, "Configuration loaded");
    Ok(config)
}

pub fn backend(config: &PipelineConfig) -> Result<Arc<HttpBackend>> {
    Ok(Arc::new(HttpBackend::new(config)?))
}

/// Session mirroring, when both a store and a user are configured.
pub fn persistence(config: &PipelineConfig) -> Result<Option<PersistenceAdapter>> {
    match (&config.store_url, &config.user_id) {
        (Some(_), Some(uid)) => {
            let store = HttpStore::new(config)?;
            Ok(Some(PersistenceAdapter::new(Arc::new(store), uid.clone())))
        }
        _ => Ok(None),
    }
}

/// Persistence for the history commands, which cannot run without it.
pub fn require_persistence(config: &PipelineConfig) -> Result<PersistenceAdapter> {
    persistence(config)?.ok_or_else(|| {
        LofuError::Config("history commands need --store-url and --user (or LOFU_STORE_URL and LOFU_USER_ID)".into())
            .into()
    })
}

pub fn history_page_size(limit: Option<usize>) -> usize {
    limit.filter(|l| *l > 0).unwrap_or(DEFAULT_HISTORY_PAGE_SIZE)
}

/// Read an image file, sniffing its MIME type.
pub fn load_image(path: &Path) -> Result<EncodedImage> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read image: {}", path.display()))?;
    info!(path = %path.display(), bytes = bytes.len(), "Read image");
    Ok(EncodedImage::from_bytes(bytes))
}

pub fn write_image(path: &Path, image: &EncodedImage) -> Result<()> {
    std::fs::write(path, &image.bytes).with_context(|| format!("Failed to write image: {}", path.display()))?;
    info!(path = %path.display(), bytes = image.bytes.len(), "Wrote image");
    Ok(())
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}

/// Format a timestamp as a human-readable UTC string.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Confidence as a percentage, or a dash when the backend gave none.
pub fn format_confidence(confidence: Option<f64>) -> String {
    confidence
        .map(|c| format!("{:.1}%", c * 100.0))
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 12, 30, 45).unwrap();
        let formatted = format_timestamp(&at);
        assert!(formatted.contains("2024-01-15"));
        assert!(formatted.contains("UTC"));
    }

    #[test]
    fn test_format_confidence() {
        assert_eq!(format_confidence(Some(0.912)), "91.2%");
        assert_eq!(format_confidence(None), "-");
    }

    #[test]
    fn test_history_page_size() {
        assert_eq!(history_page_size(None), 12);
        assert_eq!(history_page_size(Some(0)), 12);
        assert_eq!(history_page_size(Some(5)), 5);
    }
}
