//! `localfirst-store` — the durable Local Store.
//!
//! Two named collections (`customers`, `outbox`) of JSON documents behind the
//! [`LocalStore`] trait, so the backing medium is fully substitutable:
//!
//! - [`InMemoryStore`]: process-local maps (tests, demos)
//! - [`SqliteStore`]: a single SQLite file, committed before each call returns
//!
//! Callers work with typed records through [`Records`] handles obtained from
//! `store.records::<R>()`.

pub mod collection;
pub mod error;
pub mod in_memory;
pub mod records;
pub mod sqlite;
pub mod store;

pub use collection::{Collection, Record, Records, Undecodable};
pub use error::{StoreError, StoreResult};
pub use in_memory::InMemoryStore;
pub use records::{
    CreateCustomerPayload, CustomerPatch, CustomerRecord, OutboxOperation, OutboxPatch,
    OutboxRecord, OutboxStatus, SyncStatus,
};
pub use sqlite::SqliteStore;
pub use store::LocalStore;
