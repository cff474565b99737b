//! Configuration Module
//!
//! Holds the process-level cache settings and the per-instance options used
//! when wrapping a producer.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Maximum allowed cache name length in bytes
pub const MAX_NAME_LENGTH: usize = 128;

// == Process Configuration ==
/// Process-wide cache settings, read once at startup.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory under which every named store keeps its file
    pub cache_dir: PathBuf,
    /// When false, wrapped functions call their producer directly
    pub enabled: bool,
    /// Age at which an SWR entry becomes stale; default memo TTL
    pub min_time_to_stale: Duration,
    /// Age at which an SWR entry must be refetched before returning
    pub max_time_to_live: Duration,
    /// Interval of the background backstop sweep
    pub cleanup_interval: Duration,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SWR_CACHE_DIR` - Cache directory (default: `.cache/swr`)
    /// - `SWR_CACHE_ENABLED` - Enable caching (default: true)
    /// - `SWR_MIN_TIME_TO_STALE_MS` - Freshness window in ms (default: 60000)
    /// - `SWR_MAX_TIME_TO_LIVE_MS` - Expiry boundary in ms (default: 86400000)
    /// - `SWR_CLEANUP_INTERVAL_SECS` - Backstop sweep frequency (default: 300)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_dir: env::var("SWR_CACHE_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            enabled: env::var("SWR_CACHE_ENABLED")
                .ok()
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.enabled),
            min_time_to_stale: env::var("SWR_MIN_TIME_TO_STALE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.min_time_to_stale),
            max_time_to_live: env::var("SWR_MAX_TIME_TO_LIVE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_time_to_live),
            cleanup_interval: env::var("SWR_CLEANUP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.cleanup_interval),
        }
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_min_time_to_stale(mut self, min_time_to_stale: Duration) -> Self {
        self.min_time_to_stale = min_time_to_stale;
        self
    }

    pub fn with_max_time_to_live(mut self, max_time_to_live: Duration) -> Self {
        self.max_time_to_live = max_time_to_live;
        self
    }

    pub fn with_cleanup_interval(mut self, cleanup_interval: Duration) -> Self {
        self.cleanup_interval = cleanup_interval;
        self
    }

    /// Physical TTL applied to every entry of an SWR store.
    ///
    /// Twice the expiry boundary, so it never fires before an entry would
    /// already be classified as expired.
    pub fn swr_backstop(&self) -> Duration {
        self.max_time_to_live.saturating_mul(2)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(".cache/swr"),
            enabled: true,
            min_time_to_stale: Duration::from_millis(60_000),
            max_time_to_live: Duration::from_millis(86_400_000),
            cleanup_interval: Duration::from_secs(300),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// == Per-Instance Options ==
/// Options for a stale-while-revalidate cache.
#[derive(Debug, Clone)]
pub struct SwrOptions {
    /// Unique cache name, also the store's file stem
    pub name: String,
    /// Logical entry limit, 0 = unlimited
    pub max_entries: usize,
}

impl SwrOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_entries: 0,
        }
    }

    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }
}

/// Options for a TTL memo cache.
#[derive(Debug, Clone)]
pub struct MemoOptions {
    /// Unique cache name, also the store's file stem
    pub name: String,
    /// Entry limit, 0 = unlimited
    pub max_entries: usize,
    /// Entry lifetime; `None` uses the configured `min_time_to_stale`
    pub ttl: Option<Duration>,
    /// Whether entries are written to disk
    pub persist: bool,
}

impl MemoOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_entries: 0,
            ttl: None,
            persist: true,
        }
    }

    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }
}

// == Name Validation ==
/// Checks that a cache name maps to exactly one file under the cache directory.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CacheError::InvalidOptions(
            "cache name must not be empty".to_string(),
        ));
    }

    if name.len() > MAX_NAME_LENGTH {
        return Err(CacheError::InvalidOptions(format!(
            "cache name exceeds maximum length of {} bytes",
            MAX_NAME_LENGTH
        )));
    }

    if name.starts_with('.') {
        return Err(CacheError::InvalidOptions(format!(
            "cache name '{}' must not start with '.'",
            name
        )));
    }

    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(CacheError::InvalidOptions(format!(
            "cache name '{}' contains invalid character {:?}",
            name, bad
        )));
    }

    Ok(())
}
