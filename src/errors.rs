//! Sync Engine Error Hierarchy
//!
//! Defines the error types raised by each layer of the engine (backing store,
//! event decoding, lookup origin, configuration). [`Error::class`] folds every
//! variant into the three outcomes the ingestion path acts on: terminal
//! (ack and log), transient (ask for redelivery) and operational (ack, log as
//! an error, recover out of band).

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Keyed backing store failures, including conditional-write conflicts
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Inbound change events that cannot be processed
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// External lookup origin failures
    #[error(transparent)]
    Origin(#[from] OriginError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Configuration loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Conditional create found the key already present
    #[error("Key already exists: {key}")]
    KeyExists { key: String },

    /// Conditional update presented a stale revision.
    /// `current` is 0 when the key no longer exists.
    #[error("Wrong last revision for {key}: expected {expected}, current {current}")]
    RevisionMismatch {
        key: String,
        expected: u64,
        current: u64,
    },

    /// Store unreachable or refusing requests
    #[error("Backend unavailable: {0}")]
    Backend(String),

    /// Stored bytes could not be decoded under any known format
    #[error("Failed to decode stored value for {key}: {reason}")]
    Decode { key: String, reason: String },

    #[error("Failed to encode payload: {0}")]
    Encode(String),

    #[error(transparent)]
    Sled(#[from] sled::Error),

    #[error(transparent)]
    Bincode(#[from] bincode::Error),

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Payload does not parse as the declared event shape
    #[error("Malformed {kind} event: {reason}")]
    Decode { kind: &'static str, reason: String },

    /// Required identifying field missing or empty
    #[error("Missing required field `{field}` in {kind} event")]
    Validation { kind: &'static str, field: String },
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Stream no longer accepts messages
    #[error("Stream {0} is closed")]
    Closed(String),

    /// Acknowledgement could not be delivered to the broker
    #[error("Failed to settle message on {subject}: {reason}")]
    Settle { subject: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum OriginError {
    #[error("Origin unavailable: {0}")]
    Unavailable(String),

    #[error("Origin returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Origin returned invalid data for {id}: {reason}")]
    InvalidData { id: String, reason: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// How the ingestion path reacts to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Redelivery cannot change the outcome: ack and log
    Terminal,
    /// A revision race or held lock: retry against fresh state
    Transient,
    /// Infrastructure failure: ack, log as error, reconcile out of band
    Operational,
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Storage(e) if e.is_conflict() => ErrorClass::Transient,
            Error::Dispatch(_) => ErrorClass::Terminal,
            Error::Storage(_)
            | Error::Origin(_)
            | Error::Transport(_)
            | Error::Config(_)
            | Error::TaskFailed(_)
            | Error::Fatal(_) => ErrorClass::Operational,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

impl StorageError {
    /// True when a concurrent writer advanced the key first
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StorageError::KeyExists { .. } | StorageError::RevisionMismatch { .. }
        )
    }
}
