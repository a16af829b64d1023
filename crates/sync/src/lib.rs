//! `localfirst-sync` — the outbox delivery engine.
//!
//! - [`RemoteGateway`]: the outbound network seam ([`SimulatedGateway`] for demos)
//! - [`RetryPolicy`]: backoff and exhaustion rules
//! - [`SyncEngine`]: one scheduler pass over the outbox, plus manual retry reset
//! - [`SyncWorker`]: the background task that wakes the engine on triggers,
//!   ticks and reconnects
//! - [`Connectivity`]: online/offline state shared with the host

pub mod config;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod policy;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use config::SyncConfig;
pub use connectivity::{Connectivity, ConnectivityState};
pub use engine::{PassOutcome, PassReport, SyncEngine, WorkerStats};
pub use error::{ConfigError, SyncError};
pub use gateway::{GatewayError, RemoteGateway, ServerAck, SimulatedGateway};
pub use policy::{BackoffStrategy, FailureSchedule, RetryPolicy};
pub use worker::{SyncHandle, SyncTrigger, SyncWorker};
