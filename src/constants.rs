/// Soft-delete marker written by the ingestion path.
pub const FIELD_DELETED_AT: &str = "_sdc_deleted_at";

/// Source commit time of the event that produced the stored payload.
pub const FIELD_EXTRACTED_AT: &str = "_sdc_extracted_at";

/// Wall-clock time this engine wrote the stored payload.
pub const FIELD_RECEIVED_AT: &str = "_sdc_received_at";

/// Boolean deletion flag carried by replicated v1 rows.
pub const FIELD_IS_DELETED: &str = "isdeleted";

/// Fields that never take part in payload equality checks.
pub const BOOKKEEPING_FIELDS: [&str; 2] = [FIELD_EXTRACTED_AT, FIELD_RECEIVED_AT];

/// Value stored in place of a mapping that has been deleted.
pub const TOMBSTONE_MARKER: &[u8] = b"!del";

/// Prefix of lookup replies reporting an infrastructure failure.
pub const LOOKUP_ERROR_PREFIX: &str = "error: ";

/// Header carrying the key-watch operation (`DEL` / `PURGE`; absent means put).
pub const KV_OPERATION_HEADER: &str = "KV-Operation";

/// Separator between a key's table prefix and its identifier.
pub const KEY_DELIMITER: char = '.';

/// Separator between composite primary key components.
pub const COMPOSITE_KEY_SEPARATOR: &str = "#";

/// Accepted business timestamp layouts, tried in order after RFC 3339.
pub const TIMESTAMP_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
];
