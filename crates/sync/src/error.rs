//! Sync engine error model.

use thiserror::Error;

use localfirst_store::StoreError;

/// Failure of a scheduler pass or a retry reset.
///
/// Delivery failures never surface here: they are absorbed into record
/// state. Only environment-level faults propagate.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("local store failure: {0}")]
    Store(#[from] StoreError),
}

/// Invalid configuration value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}
