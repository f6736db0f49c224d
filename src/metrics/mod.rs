//! Prometheus counters for the sync pipeline.
//!
//! Collectors are created lazily and registered into [`REGISTRY`] by
//! [`register_custom_metrics`]. Exposition is left to the embedding process.

use lazy_static::lazy_static;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;

lazy_static! {
    /// Dispatch decisions per source (`ack`, `retry`, `dropped`, `invalid`, `failed`)
    pub static ref DISPATCH_OUTCOMES: IntCounterVec = IntCounterVec::new(
        Opts::new("dispatch_outcomes", "Dispatch decisions per source"),
        &["source", "decision"]
    )
    .expect("metric can not be created");

    /// Object store write results (`created`, `updated`, `unchanged`, `discarded`, `conflict`)
    pub static ref STORE_WRITES: IntCounterVec = IntCounterVec::new(
        Opts::new("store_writes", "Versioned object store write outcomes"),
        &["outcome"]
    )
    .expect("metric can not be created");

    /// Cache lookups by entry state (`fresh`, `stale`, `expired`, `miss`)
    pub static ref CACHE_LOOKUPS: IntCounterVec = IntCounterVec::new(
        Opts::new("cache_lookups", "Lookup cache hits by freshness"),
        &["state"]
    )
    .expect("metric can not be created");

    /// Background refreshes skipped because the refresh pool was saturated
    pub static ref CACHE_REFRESH_SKIPPED: IntCounter = IntCounter::new(
        "cache_refresh_skipped",
        "Background refreshes skipped under saturation"
    )
    .expect("metric can not be created");

    /// Messages dropped by the transport after exhausting redeliveries
    pub static ref ABANDONED_DELIVERIES: IntCounterVec = IntCounterVec::new(
        Opts::new("abandoned_deliveries", "Messages abandoned after max deliveries"),
        &["source"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

/// Registers every collector into `registry`.
///
/// Registering twice into the same registry fails; callers register once at
/// startup.
pub fn register_custom_metrics(registry: &Registry) -> prometheus::Result<()> {
    registry.register(Box::new(DISPATCH_OUTCOMES.clone()))?;
    registry.register(Box::new(STORE_WRITES.clone()))?;
    registry.register(Box::new(CACHE_LOOKUPS.clone()))?;
    registry.register(Box::new(CACHE_REFRESH_SKIPPED.clone()))?;
    registry.register(Box::new(ABANDONED_DELIVERIES.clone()))?;
    Ok(())
}

/// Renders `registry` in the text exposition format.
pub fn gather_text(registry: &Registry) -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        tracing::warn!("could not encode custom metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}
