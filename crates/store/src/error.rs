//! Local Store error model.

use thiserror::Error;

use crate::collection::Collection;

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage failure.
///
/// These are environment-level faults: the sync engine does not retry them,
/// it aborts the current pass and lets the caller observe the error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored document {collection}/{key} is not a JSON object")]
    NotAnObject { collection: Collection, key: String },

    #[error("patch for {0} must be a JSON object")]
    InvalidPatch(Collection),

    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}
