//! Remote Gateway: the single outbound network operation.
//!
//! The gateway makes no idempotency promise of its own. The engine calls
//! [`RemoteGateway::create_customer`] at most once per due attempt and treats
//! a delivered entry as terminal.

use std::ops::RangeInclusive;
use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use localfirst_store::CreateCustomerPayload;

/// Successful response: the server-assigned identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAck {
    pub id: String,
}

/// Failed delivery attempt.
///
/// Every variant takes the same backoff path; [`GatewayError::retriable`] is
/// informational.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Transport-level failure (connection refused, reset, DNS, ...).
    #[error("{0}")]
    Unavailable(String),

    /// The server answered with a non-success status.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// No answer within the engine's deadline.
    #[error("gateway_timeout after {0:?}")]
    Timeout(Duration),
}

impl GatewayError {
    /// Build a rejection, falling back to `HTTP <status>` for an empty body.
    pub fn rejected(status: u16, message: Option<String>) -> Self {
        let message = message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("HTTP {status}"));
        Self::Rejected { status, message }
    }

    /// Whether a later attempt could plausibly succeed.
    pub fn retriable(&self) -> bool {
        match self {
            GatewayError::Unavailable(_) | GatewayError::Timeout(_) => true,
            GatewayError::Rejected { status, .. } => *status >= 500 || *status == 429,
        }
    }
}

/// Outbound operations the sync engine replays.
#[async_trait::async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Submit a new customer; returns the server-assigned id.
    async fn create_customer(
        &self,
        payload: &CreateCustomerPayload,
    ) -> Result<ServerAck, GatewayError>;
}

/// Stand-in for a real network client: randomized latency and failures.
#[derive(Debug)]
pub struct SimulatedGateway {
    latency_ms: RangeInclusive<u64>,
    failure_rate: f64,
    rng: Mutex<StdRng>,
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedGateway {
    /// 200–1000 ms latency, 20% failures.
    pub fn new() -> Self {
        Self {
            latency_ms: 200..=1_000,
            failure_rate: 0.2,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible sequence of latencies and outcomes.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Probability of a failed call, clamped to `[0, 1]` (NaN means never).
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) };
        self
    }

    pub fn with_latency(mut self, latency_ms: RangeInclusive<u64>) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Draw latency, outcome and server id up front so the lock is not held
    /// across the simulated network wait.
    fn roll(&self) -> (Duration, bool, String) {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let latency = rng.gen_range(self.latency_ms.clone());
        let fail = rng.gen_bool(self.failure_rate);
        let server_id = format!("srv_{:08x}", rng.r#gen::<u32>());
        (Duration::from_millis(latency), fail, server_id)
    }
}

#[async_trait::async_trait]
impl RemoteGateway for SimulatedGateway {
    async fn create_customer(
        &self,
        payload: &CreateCustomerPayload,
    ) -> Result<ServerAck, GatewayError> {
        let (latency, fail, server_id) = self.roll();
        tokio::time::sleep(latency).await;

        if fail {
            tracing::debug!(temp_id = %payload.temp_id, ?latency, "simulated gateway failure");
            return Err(GatewayError::rejected(500, Some("mock_error".to_string())));
        }

        tracing::debug!(temp_id = %payload.temp_id, %server_id, ?latency, "simulated gateway accepted");
        Ok(ServerAck { id: server_id })
    }
}
