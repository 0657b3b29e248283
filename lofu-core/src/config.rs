//! Pipeline configuration.
//!
//! Built once at process start (from the environment or explicitly) and
//! passed by reference to every component that talks to the network.

use std::time::Duration;

use crate::error::{LofuError, Result};
use crate::ranker::RankPolicy;

/// Backend used when nothing is configured.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5000";

/// Default request timeout for backend and store calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default detection interval for the live preview.
pub const DEFAULT_PREVIEW_INTERVAL: Duration = Duration::from_millis(1500);

/// Default page size of the capture history.
pub const DEFAULT_HISTORY_PAGE_SIZE: usize = 12;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Base URL of the detect/classify/report backend.
    pub backend_url: String,
    /// Base URL of the document/object store (persistence disabled when unset).
    pub store_url: Option<String>,
    /// Owner of persisted capture records.
    pub user_id: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Ranking policy applied after detection.
    pub rank_policy: RankPolicy,
    /// Detection interval of the live preview.
    pub preview_interval: Duration,
    /// History page size.
    pub history_page_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            store_url: None,
            user_id: None,
            timeout: DEFAULT_TIMEOUT,
            rank_policy: RankPolicy::capture(),
            preview_interval: DEFAULT_PREVIEW_INTERVAL,
            history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    ///
    /// - `LOFU_BACKEND_URL` (falls back to `REACT_APP_API_URL`)
    /// - `LOFU_STORE_URL`
    /// - `LOFU_USER_ID`
    /// - `LOFU_TIMEOUT_SECS`
    /// - `LOFU_PREVIEW_INTERVAL_MS`
    /// - `LOFU_REVIEW_MODE` (`true` keeps up to four detections)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let backend_url = non_empty("LOFU_BACKEND_URL")
            .or_else(|| non_empty("REACT_APP_API_URL"))
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());

        let timeout = non_empty("LOFU_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);

        let preview_interval = non_empty("LOFU_PREVIEW_INTERVAL_MS")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_PREVIEW_INTERVAL);

        let rank_policy = match non_empty("LOFU_REVIEW_MODE") {
            Some(v) if v.eq_ignore_ascii_case("true") => RankPolicy::review(),
            _ => RankPolicy::capture(),
        };

        Self {
            backend_url,
            store_url: non_empty("LOFU_STORE_URL"),
            user_id: non_empty("LOFU_USER_ID"),
            timeout,
            rank_policy,
            preview_interval,
            history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
        }
    }

    /// Check that the URLs are usable before any client is built.
    pub fn validate(&self) -> Result<()> {
        check_http_url("backend URL", &self.backend_url)?;
        if let Some(store_url) = &self.store_url {
            check_http_url("store URL", store_url)?;
        }
        if self.timeout.is_zero() {
            return Err(LofuError::Config("timeout must be non-zero".into()));
        }
        if self.rank_policy.cap == 0 {
            return Err(LofuError::Config("rank cap must be at least 1".into()));
        }
        if self.preview_interval.is_zero() {
            return Err(LofuError::Config("preview interval must be non-zero".into()));
        }
        Ok(())
    }

    /// Absolute URL of a backend endpoint.
    pub fn endpoint(&self, path: &str) -> String {
        join_url(&self.backend_url, path)
    }
}

/// Join a base URL and a path with exactly one slash between them.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn check_http_url(what: &str, url: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(LofuError::Config(format!(
            "{what} must start with http:// or https://, got {url:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.backend_url, DEFAULT_BACKEND_URL);
        assert_eq!(config.rank_policy, RankPolicy::capture());
        assert!(config.store_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_prefers_lofu_variable() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("LOFU_BACKEND_URL", "https://api.lofu.app/"),
            ("REACT_APP_API_URL", "http://legacy:5000"),
            ("LOFU_TIMEOUT_SECS", "5"),
            ("LOFU_REVIEW_MODE", "TRUE"),
            ("LOFU_USER_ID", "user-1"),
        ]));
        assert_eq!(config.backend_url, "https://api.lofu.app/");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.rank_policy, RankPolicy::review());
        assert_eq!(config.user_id.as_deref(), Some("user-1"));
    }

    #[test]
    fn test_from_lookup_legacy_and_blank_values() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("LOFU_BACKEND_URL", "   "),
            ("REACT_APP_API_URL", "http://legacy:5000"),
            ("LOFU_TIMEOUT_SECS", "soon"),
        ]));
        assert_eq!(config.backend_url, "http://legacy:5000");
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_endpoint_joins_slashes() {
        let config = PipelineConfig {
            backend_url: "http://localhost:5000///".into(),
            ..Default::default()
        };
        assert_eq!(config.endpoint("/detect"), "http://localhost:5000/detect");
        assert_eq!(join_url("http://a", "b/c"), "http://a/b/c");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_url = PipelineConfig {
            backend_url: "localhost:5000".into(),
            ..Default::default()
        };
        assert!(matches!(bad_url.validate(), Err(LofuError::Config(_))));

        let bad_store = PipelineConfig {
            store_url: Some("ftp://store".into()),
            ..Default::default()
        };
        assert!(bad_store.validate().is_err());

        let zero_cap = PipelineConfig {
            rank_policy: RankPolicy {
                cap: 0,
                ..RankPolicy::capture()
            },
            ..Default::default()
        };
        assert!(zero_cap.validate().is_err());
    }

    #[test]
    fn test_zero_preview_interval_is_rejected() {
        let config = PipelineConfig::from_lookup(lookup(&[("LOFU_PREVIEW_INTERVAL_MS", "0")]));
        assert_eq!(config.preview_interval, Duration::ZERO);
        assert!(matches!(config.validate(), Err(LofuError::Config(msg)) if msg.contains("preview interval")));

        let config = PipelineConfig::from_lookup(lookup(&[("LOFU_PREVIEW_INTERVAL_MS", "250")]));
        assert_eq!(config.preview_interval, Duration::from_millis(250));
        assert!(config.validate().is_ok());
    }
}
