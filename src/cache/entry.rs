use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// What the origin said about an identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CachedValue {
    Found { value: Value },
    /// Origin failed or returned invalid data. Cached like a success so a
    /// failing origin is not hammered.
    Negative { reason: String },
}

impl CachedValue {
    pub fn is_negative(&self) -> bool {
        matches!(self, CachedValue::Negative { .. })
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            CachedValue::Found { value } => Some(value),
            CachedValue::Negative { .. } => None,
        }
    }
}

/// Stored cache record; replaced wholesale on every fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub id: String,
    pub result: CachedValue,
    /// Unix seconds
    pub fetched_at: i64,
}

impl CacheEntry {
    pub fn age(
        &self,
        now_unix_secs: i64,
    ) -> Duration {
        Duration::from_secs(now_unix_secs.saturating_sub(self.fetched_at).max(0) as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// age <= fresh window
    Fresh,
    /// fresh window < age <= stale window
    Stale,
    /// age > stale window
    Expired,
}

impl Freshness {
    pub fn classify(
        age: Duration,
        fresh_window: Duration,
        stale_window: Duration,
    ) -> Self {
        if age <= fresh_window {
            Freshness::Fresh
        } else if age <= stale_window {
            Freshness::Stale
        } else {
            Freshness::Expired
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Freshness::Fresh => "fresh",
            Freshness::Stale => "stale",
            Freshness::Expired => "expired",
        }
    }
}
