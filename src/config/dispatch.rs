use serde::Deserialize;
use serde::Serialize;

use super::require_non_empty;
use crate::Result;

/// Event decoding and conflict-resolution settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DispatchConfig {
    /// Identity this service writes into v1 as last modifier.
    /// Events carrying it are dropped. Empty disables the filter.
    #[serde(default)]
    pub writer_identity: String,

    /// Payload field holding the last-modifier identity
    #[serde(default = "default_last_modified_by_field")]
    pub last_modified_by_field: String,

    /// Primary key column of write-ahead-log rows
    #[serde(default = "default_primary_key_field")]
    pub primary_key_field: String,

    /// Business timestamps compared for write-ahead-log upserts
    #[serde(default = "default_log_timestamp_fields")]
    pub log_timestamp_fields: Vec<String>,

    /// Business timestamps compared for table-stream upserts
    #[serde(default = "default_stream_timestamp_fields")]
    pub stream_timestamp_fields: Vec<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            writer_identity: String::new(),
            last_modified_by_field: default_last_modified_by_field(),
            primary_key_field: default_primary_key_field(),
            log_timestamp_fields: default_log_timestamp_fields(),
            stream_timestamp_fields: default_stream_timestamp_fields(),
        }
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<()> {
        require_non_empty(&self.last_modified_by_field, "dispatch.last_modified_by_field")?;
        require_non_empty(&self.primary_key_field, "dispatch.primary_key_field")?;
        for field in self
            .log_timestamp_fields
            .iter()
            .chain(self.stream_timestamp_fields.iter())
        {
            require_non_empty(field, "dispatch timestamp field")?;
        }
        Ok(())
    }
}

fn default_last_modified_by_field() -> String {
    "lastmodifiedbyid".to_string()
}
fn default_primary_key_field() -> String {
    "sfid".to_string()
}
fn default_log_timestamp_fields() -> Vec<String> {
    vec!["systemmodstamp".to_string(), "lastmodifieddate".to_string()]
}
fn default_stream_timestamp_fields() -> Vec<String> {
    vec!["modified_at".to_string()]
}
