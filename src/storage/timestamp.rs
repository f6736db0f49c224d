use chrono::DateTime;
use chrono::NaiveDateTime;
use chrono::Utc;

use super::Document;
use crate::constants::TIMESTAMP_FORMATS;

/// Parses a business timestamp.
///
/// RFC 3339 (any offset, any fractional precision) is tried first, then the
/// zone-less layouts in [`TIMESTAMP_FORMATS`], which are read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

/// Any-configured-field-is-newer rule.
///
/// The candidate wins when at least one field parses on both sides and is
/// strictly later in the candidate, or when no field parses on both sides.
pub fn is_candidate_newer(
    candidate: &Document,
    stored: &Document,
    timestamp_fields: &[String],
) -> bool {
    let mut comparable = false;
    for field in timestamp_fields {
        if let (Some(new), Some(old)) = (candidate.timestamp(field), stored.timestamp(field)) {
            if new > old {
                return true;
            }
            comparable = true;
        }
    }
    !comparable
}
