//! `localfirst-customers` — the application-facing Customer Service.
//!
//! Creating a customer is a purely local write: the record and its outbox
//! entry are persisted, the sync worker is nudged, and the call returns
//! without touching the network.

pub mod error;
pub mod service;

pub use error::{ServiceError, ServiceResult};
pub use service::{CreateCustomer, CustomerService, SyncSummary};
