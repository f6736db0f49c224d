//! Configuration management for the sync engine.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support (`CONFIG_PATH`)
//! - Environment variable overrides (`SYNC__` prefix)
//! - Component-wise validation
mod cache;
mod consumer;
mod dispatch;
mod membership;
mod store;
pub use cache::*;
pub use consumer::*;
pub use dispatch::*;
pub use membership::*;
pub use store::*;

use std::env;
use std::fmt::Debug;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Main configuration container for the sync engine components
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct SyncConfig {
    /// Backing buckets and payload encoding
    #[serde(default)]
    pub store: StoreConfig,
    /// Event decoding, key derivation and conflict resolution
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Stale-while-revalidate lookup cache
    #[serde(default)]
    pub cache: CacheConfig,
    /// Membership list maintenance
    #[serde(default)]
    pub membership: MembershipConfig,
    /// Per-source consumer pools
    #[serde(default)]
    pub consumer: ConsumerPolicies,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Debug for SyncConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SyncConfig")
            .field("store", &self.store)
            .field("dispatch", &self.dispatch)
            .finish_non_exhaustive()
    }
}

impl SyncConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Sources are merged in order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `SYNC__` prefix (highest priority)
    ///
    /// Callers MUST call `validate()` before using the configuration.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("SYNC__DISPATCH__WRITER_IDENTITY", "abc@clients");
    /// let cfg = SyncConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every section and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.store.validate()?;
        self.dispatch.validate()?;
        self.cache.validate()?;
        self.membership.validate()?;
        self.consumer.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("SYNC")
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ObservabilityConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

pub(super) fn invalid(msg: String) -> Error {
    Error::Config(ConfigError::Message(msg))
}

/// Rejects empty names used to build store keys
pub(super) fn require_non_empty(
    value: &str,
    name: &str,
) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(format!("{name} cannot be empty")));
    }
    Ok(())
}
