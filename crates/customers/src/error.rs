//! Customer service errors.

use thiserror::Error;

use localfirst_core::DomainError;
use localfirst_store::StoreError;
use localfirst_sync::SyncError;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}
