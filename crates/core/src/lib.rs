//! `localfirst-core` — foundation building blocks shared by the store, the
//! sync engine and the customer service.
//!
//! This crate contains **pure** primitives (no IO, no runtime).

pub mod clock;
pub mod entity;
pub mod error;
pub mod id;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{CustomerId, OpId};
