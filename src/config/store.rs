use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use super::require_non_empty;
use crate::PayloadFormat;
use crate::Result;

/// Backing store settings shared by every component
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreConfig {
    /// Serialization used for new writes; the other format stays readable
    #[serde(default)]
    pub format: PayloadFormat,

    /// Bucket holding mirrored v1 records
    #[serde(default = "default_objects_bucket")]
    pub objects_bucket: String,

    /// Bucket holding mappings, membership lists, cache entries and locks
    #[serde(default = "default_mappings_bucket")]
    pub mappings_bucket: String,

    /// Root directory for the sled-backed buckets
    #[serde(default = "default_db_root_dir")]
    pub db_root_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            format: PayloadFormat::default(),
            objects_bucket: default_objects_bucket(),
            mappings_bucket: default_mappings_bucket(),
            db_root_dir: default_db_root_dir(),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        require_non_empty(&self.objects_bucket, "store.objects_bucket")?;
        require_non_empty(&self.mappings_bucket, "store.mappings_bucket")?;
        if self.objects_bucket == self.mappings_bucket {
            return Err(super::invalid(format!(
                "store.objects_bucket and store.mappings_bucket must differ, both are {}",
                self.objects_bucket
            )));
        }
        Ok(())
    }
}

fn default_objects_bucket() -> String {
    "v1-objects".to_string()
}
fn default_mappings_bucket() -> String {
    "v1-mappings".to_string()
}
fn default_db_root_dir() -> PathBuf {
    PathBuf::from("./db")
}
