//! Runtime configuration and tuning constants
//!
//! [`IngestConfig`] is built once by the CLI (flags with environment
//! fallbacks, `.env` loaded first) and passed down explicitly.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default API base URL
pub const DEFAULT_API_BASE_URL: &str = "https://api.football-data-api.com";

/// Default hourly request quota.
pub const DEFAULT_REQUESTS_PER_HOUR: u32 = 1800;

/// Attempts per logical request before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Sleep after a 429 response before the next attempt.
pub const RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(60);

/// Base of the exponential backoff for transient failures (`2^attempt` seconds).
pub const INITIAL_BACKOFF_MS: u64 = 1000;

/// Cap on a single backoff sleep.
pub const MAX_BACKOFF_MS: u64 = 300_000;

/// TCP connect timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Whole-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size requested for league matches.
pub const MATCHES_PER_PAGE: u32 = 500;

/// Ledger checkpoint cadence for per-team last-N form fetches.
pub const LASTX_CHECKPOINT_INTERVAL: u64 = 5;

/// Ledger checkpoint cadence for per-match detail fetches.
pub const MATCH_DETAILS_CHECKPOINT_INTERVAL: u64 = 10;

/// Upper bound on pages walked for a single paged stage.
pub const MAX_PAGES: u32 = 1_000;

/// Calculate exponential backoff delay: `2^retry_count` seconds, capped.
pub fn calculate_backoff(retry_count: u32) -> Duration {
    let factor = 2u64.checked_pow(retry_count).unwrap_or(u64::MAX);
    let delay_ms = INITIAL_BACKOFF_MS.saturating_mul(factor).min(MAX_BACKOFF_MS);
    Duration::from_millis(delay_ms)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No API key configured
    #[error("API key is required (set FOOTYSTATS_API_KEY or pass --api-key)")]
    MissingApiKey,

    /// Quota must allow at least one request
    #[error("requests per hour must be at least 1")]
    ZeroQuota,

    /// At least one attempt per request
    #[error("max retries must be at least 1")]
    ZeroRetries,

    /// Base URL is not http(s)
    #[error("invalid API base URL: {0}")]
    InvalidBaseUrl(String),
}

/// Ingestion configuration
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// API key sent as the `key` query parameter
    pub api_key: String,
    /// API base URL
    pub api_base_url: String,
    /// Root of the data tree
    pub data_dir: PathBuf,
    /// Hourly request quota
    pub requests_per_hour: u32,
    /// Attempts per logical request
    pub max_retries: u32,
    /// Sleep after a 429
    pub rate_limit_cooldown: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Whole-request timeout
    pub request_timeout: Duration,
}

impl IngestConfig {
    /// Configuration with defaults for everything but the key and data directory
    pub fn new(api_key: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            data_dir: data_dir.into(),
            requests_per_hour: DEFAULT_REQUESTS_PER_HOUR,
            max_retries: DEFAULT_MAX_RETRIES,
            rate_limit_cooldown: RATE_LIMIT_COOLDOWN,
            connect_timeout: CONNECT_TIMEOUT,
            request_timeout: REQUEST_TIMEOUT,
        }
    }

    /// Override the base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api_base_url = base_url.into();
        self
    }

    /// Override the hourly quota
    pub fn with_requests_per_hour(mut self, requests_per_hour: u32) -> Self {
        self.requests_per_hour = requests_per_hour;
        self
    }

    /// Override attempts per request
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Check values the rest of the crate relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.requests_per_hour == 0 {
            return Err(ConfigError::ZeroQuota);
        }
        if self.max_retries == 0 {
            return Err(ConfigError::ZeroRetries);
        }
        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://"))
        {
            return Err(ConfigError::InvalidBaseUrl(self.api_base_url.clone()));
        }
        Ok(())
    }

    /// `<data>/leagues`, one directory per league/season
    pub fn leagues_dir(&self) -> PathBuf {
        self.data_dir.join("leagues")
    }

    /// `<data>/stats`, global statistics tables
    pub fn stats_dir(&self) -> PathBuf {
        self.data_dir.join("stats")
    }

    /// `<data>/ingestion_state`, ledgers and rate limiter state
    pub fn state_dir(&self) -> PathBuf {
        state_dir(&self.data_dir)
    }

    /// Persisted rate limiter window
    pub fn rate_limiter_state_path(&self) -> PathBuf {
        rate_limiter_state_path(&self.data_dir)
    }
}

/// `<data>/ingestion_state`
pub fn state_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("ingestion_state")
}

/// `<data>/ingestion_state/rate_limiter_state.json`
pub fn rate_limiter_state_path(data_dir: &Path) -> PathBuf {
    state_dir(data_dir).join("rate_limiter_state.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        assert_eq!(calculate_backoff(0), Duration::from_secs(1));
        assert_eq!(calculate_backoff(1), Duration::from_secs(2));
        assert_eq!(calculate_backoff(2), Duration::from_secs(4));
        assert_eq!(calculate_backoff(3), Duration::from_secs(8));
        // Should cap at MAX_BACKOFF_MS
        assert_eq!(calculate_backoff(20), Duration::from_millis(MAX_BACKOFF_MS));
        assert_eq!(calculate_backoff(200), Duration::from_millis(MAX_BACKOFF_MS));
    }

    #[test]
    fn test_defaults_and_paths() {
        let config = IngestConfig::new("key", "/tmp/data");
        assert_eq!(config.requests_per_hour, 1800);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.leagues_dir(), PathBuf::from("/tmp/data/leagues"));
        assert_eq!(config.stats_dir(), PathBuf::from("/tmp/data/stats"));
        assert_eq!(
            config.rate_limiter_state_path(),
            PathBuf::from("/tmp/data/ingestion_state/rate_limiter_state.json")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_failures() {
        assert!(matches!(
            IngestConfig::new("  ", "d").validate(),
            Err(ConfigError::MissingApiKey)
        ));
        assert!(matches!(
            IngestConfig::new("k", "d").with_requests_per_hour(0).validate(),
            Err(ConfigError::ZeroQuota)
        ));
        assert!(matches!(
            IngestConfig::new("k", "d").with_max_retries(0).validate(),
            Err(ConfigError::ZeroRetries)
        ));
        assert!(matches!(
            IngestConfig::new("k", "d").with_base_url("ftp://x").validate(),
            Err(ConfigError::InvalidBaseUrl(_))
        ));
    }
}
