use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use super::require_non_empty;
use crate::LockOptions;
use crate::Result;

/// Stale-while-revalidate cache for origin lookups
///
/// Negative (origin error) entries share both windows with successful ones.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
    /// Age up to which an entry is served without any refresh (unit: seconds)
    #[serde(default = "default_fresh_window_secs")]
    pub fresh_window_secs: u64,

    /// Age up to which an entry is served while refreshing in the background
    /// (unit: seconds)
    #[serde(default = "default_stale_window_secs")]
    pub stale_window_secs: u64,

    /// Key prefix of cache entries in the mappings bucket
    #[serde(default = "default_entry_prefix")]
    pub entry_prefix: String,

    /// Key prefix of refresh locks in the mappings bucket
    #[serde(default = "default_lock_prefix")]
    pub lock_prefix: String,

    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    #[serde(default = "default_lock_retry_interval_ms")]
    pub lock_retry_interval_ms: u64,

    /// Acquire attempts on the expired path; the stale path always tries once
    #[serde(default = "default_lock_max_attempts")]
    pub lock_max_attempts: usize,

    /// Origin endpoint; the identifier is appended. Empty disables lookups.
    #[serde(default)]
    pub origin_base_url: String,

    /// Origin field that must be present and non-empty for a valid record
    #[serde(default = "default_required_field")]
    pub required_field: String,

    #[serde(default = "default_origin_timeout_ms")]
    pub origin_timeout_ms: u64,

    /// Upper bound on concurrently running background refreshes
    #[serde(default = "default_max_background_refreshes")]
    pub max_background_refreshes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            fresh_window_secs: default_fresh_window_secs(),
            stale_window_secs: default_stale_window_secs(),
            entry_prefix: default_entry_prefix(),
            lock_prefix: default_lock_prefix(),
            lock_timeout_ms: default_lock_timeout_ms(),
            lock_retry_interval_ms: default_lock_retry_interval_ms(),
            lock_max_attempts: default_lock_max_attempts(),
            origin_base_url: String::new(),
            required_field: default_required_field(),
            origin_timeout_ms: default_origin_timeout_ms(),
            max_background_refreshes: default_max_background_refreshes(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.fresh_window_secs >= self.stale_window_secs {
            return Err(invalid(format!(
                "cache fresh_window_secs ({}) must be lower than stale_window_secs ({})",
                self.fresh_window_secs, self.stale_window_secs
            )));
        }
        require_non_empty(&self.entry_prefix, "cache.entry_prefix")?;
        require_non_empty(&self.lock_prefix, "cache.lock_prefix")?;
        if self.entry_prefix == self.lock_prefix {
            return Err(invalid(
                "cache.entry_prefix and cache.lock_prefix must differ".to_string(),
            ));
        }
        if self.max_background_refreshes == 0 {
            return Err(invalid(
                "cache.max_background_refreshes must be at least 1".to_string(),
            ));
        }
        validate_lock_policy("cache.lock", self.lock_timeout_ms, self.lock_max_attempts)
    }

    pub fn fresh_window(&self) -> Duration {
        Duration::from_secs(self.fresh_window_secs)
    }

    pub fn stale_window(&self) -> Duration {
        Duration::from_secs(self.stale_window_secs)
    }

    pub fn origin_timeout(&self) -> Duration {
        Duration::from_millis(self.origin_timeout_ms)
    }

    /// Options for the blocking (expired entry) refresh path
    pub fn lock_options(&self) -> LockOptions {
        LockOptions {
            timeout: Duration::from_millis(self.lock_timeout_ms),
            retry_interval: Duration::from_millis(self.lock_retry_interval_ms),
            max_attempts: self.lock_max_attempts,
        }
    }
}

/// Holder markers have one-second resolution, so sub-second timeouts would
/// treat every lock as stale.
fn validate_lock_policy(
    section: &str,
    timeout_ms: u64,
    max_attempts: usize,
) -> Result<()> {
    if timeout_ms < 1000 {
        return Err(invalid(format!(
            "{section} timeout_ms must be at least 1000, got {timeout_ms}"
        )));
    }
    if max_attempts == 0 {
        return Err(invalid(format!("{section} max_attempts must be at least 1")));
    }
    Ok(())
}

fn default_fresh_window_secs() -> u64 {
    30 * 60
}
fn default_stale_window_secs() -> u64 {
    6 * 60 * 60
}
fn default_entry_prefix() -> String {
    "v1_org.".to_string()
}
fn default_lock_prefix() -> String {
    "v1_org_lock.".to_string()
}
fn default_lock_timeout_ms() -> u64 {
    10_000
}
fn default_lock_retry_interval_ms() -> u64 {
    1000
}
fn default_lock_max_attempts() -> usize {
    3
}
fn default_required_field() -> String {
    "Name".to_string()
}
fn default_origin_timeout_ms() -> u64 {
    10_000
}
fn default_max_background_refreshes() -> usize {
    16
}
