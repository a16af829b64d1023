//! Persisted record shapes and their state-transition patches.

pub mod customer;
pub mod outbox;

pub use customer::{CustomerPatch, CustomerRecord, SyncStatus};
pub use outbox::{CreateCustomerPayload, OutboxOperation, OutboxPatch, OutboxRecord, OutboxStatus};
