//! Process-wide tracing setup for the demo binary and test harnesses.
//!
//! Both entry points are idempotent: only the first call installs a
//! subscriber.

/// Subscriber construction (filters, formatters).
pub mod tracing;

pub use self::tracing::{init, init_for_tests};
