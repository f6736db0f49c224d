use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// return second
pub(crate) fn get_now_as_u64() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Current UTC time, formatted as RFC 3339 with microseconds
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}
