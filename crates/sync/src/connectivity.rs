//! Online/offline state shared between the host application and the worker.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Connectivity state of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    /// Network reachable; deliveries may proceed.
    Online,
    /// Network unreachable; the outbox only accumulates.
    Offline,
}

/// Cloneable handle over the current [`ConnectivityState`].
///
/// The host flips it from its own network-change signal; the worker watches
/// it and wakes on every offline -> online transition.
#[derive(Debug, Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<ConnectivityState>>,
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(ConnectivityState::Online)
    }
}

impl Connectivity {
    pub fn new(initial: ConnectivityState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn online() -> Self {
        Self::new(ConnectivityState::Online)
    }

    pub fn offline() -> Self {
        Self::new(ConnectivityState::Offline)
    }

    pub fn state(&self) -> ConnectivityState {
        *self.tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.state() == ConnectivityState::Online
    }

    /// Mark the client as online.
    pub fn set_online(&self) {
        self.set(ConnectivityState::Online);
    }

    /// Mark the client as offline.
    pub fn set_offline(&self) {
        self.set(ConnectivityState::Offline);
    }

    fn set(&self, state: ConnectivityState) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            tracing::info!(?state, "connectivity changed");
        }
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.tx.subscribe()
    }
}
