//! Background task that wakes the engine.
//!
//! Wake sources:
//! - explicit triggers (after an enqueue or a retry reset)
//! - a fixed tick as a safety net
//! - every offline -> online transition
//!
//! Triggers go through a channel of capacity one, so any number of triggers
//! arriving during a pass collapse into a single follow-up pass.

use std::sync::Arc;

use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use localfirst_core::OpId;

use crate::connectivity::ConnectivityState;
use crate::engine::{PassOutcome, SyncEngine, WorkerStats};
use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WakeReason {
    Tick,
    Trigger,
    Reconnected,
}

/// Cloneable wake-up signal for a running worker.
#[derive(Debug, Clone)]
pub struct SyncTrigger {
    tx: mpsc::Sender<()>,
}

impl SyncTrigger {
    /// Request a pass. Never blocks; coalesces with a pending request.
    pub fn trigger(&self) {
        match self.tx.try_send(()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(())) => {
                debug!("sync wake already pending");
            }
            Err(mpsc::error::TrySendError::Closed(())) => {
                debug!("sync worker stopped; wake ignored");
            }
        }
    }
}

/// Handle to control a running worker.
///
/// Dropping the handle stops the loop after its current pass; call
/// [`SyncHandle::shutdown`] to also wait for that.
#[derive(Debug)]
pub struct SyncHandle {
    engine: Arc<SyncEngine>,
    trigger: SyncTrigger,
    shutdown: Arc<Notify>,
    join: Option<JoinHandle<()>>,
}

impl SyncHandle {
    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Wake the worker for an immediate pass.
    pub fn trigger(&self) {
        self.trigger.trigger();
    }

    /// A detached trigger for producers that outlive this borrow.
    pub fn trigger_handle(&self) -> SyncTrigger {
        self.trigger.clone()
    }

    /// Manual retry reset followed by a wake-up when anything was reset.
    pub async fn retry(&self, op_id: Option<OpId>) -> Result<usize, SyncError> {
        let reset = self.engine.reset_for_retry(op_id).await?;
        if reset > 0 {
            self.trigger();
        }
        Ok(reset)
    }

    pub fn stats(&self) -> WorkerStats {
        self.engine.stats()
    }

    /// Request graceful shutdown and wait for the in-flight pass to finish.
    pub async fn shutdown(mut self) {
        self.shutdown.notify_one();
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                error!(error = %e, "sync worker task failed");
            }
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.shutdown.notify_one();
        }
    }
}

/// The worker loop state.
pub struct SyncWorker {
    engine: Arc<SyncEngine>,
    wake_rx: mpsc::Receiver<()>,
    connectivity_rx: watch::Receiver<ConnectivityState>,
    shutdown: Arc<Notify>,
}

impl SyncWorker {
    /// Start the worker on the current tokio runtime.
    ///
    /// Entries left `processing` by a previous process are requeued, then an
    /// initial pass runs immediately.
    pub fn spawn(engine: Arc<SyncEngine>) -> SyncHandle {
        let (wake_tx, wake_rx) = mpsc::channel(1);
        let shutdown = Arc::new(Notify::new());

        let worker = SyncWorker {
            engine: engine.clone(),
            wake_rx,
            connectivity_rx: engine.connectivity().subscribe(),
            shutdown: shutdown.clone(),
        };
        let join = tokio::spawn(worker.run());

        SyncHandle {
            engine,
            trigger: SyncTrigger { tx: wake_tx },
            shutdown,
            join: Some(join),
        }
    }

    async fn run(mut self) {
        let tick_interval = self.engine.config().tick_interval;
        info!(tick_ms = tick_interval.as_millis() as u64, "sync worker started");

        if let Err(e) = self.engine.recover_interrupted().await {
            error!(error = %e, "failed to requeue interrupted outbox entries");
        }

        // The first tick completes immediately and doubles as the initial pass.
        let mut tick = tokio::time::interval(tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let reason = tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("sync worker received shutdown signal");
                    break;
                }
                _ = tick.tick() => WakeReason::Tick,
                Some(()) = self.wake_rx.recv() => WakeReason::Trigger,
                Ok(()) = self.connectivity_rx.changed() => {
                    let state = *self.connectivity_rx.borrow_and_update();
                    if state != ConnectivityState::Online {
                        debug!("client offline; waiting for reconnect");
                        continue;
                    }
                    WakeReason::Reconnected
                }
            };

            Self::pass(&self.engine, reason).await;
        }

        info!("sync worker stopped");
    }

    async fn pass(engine: &SyncEngine, reason: WakeReason) {
        if !engine.connectivity().is_online() {
            debug!(?reason, "skipping sync pass while offline");
            return;
        }

        match engine.process_outbox().await {
            Ok(PassOutcome::Completed(report)) if report.attempted() > 0 || report.snoozed > 0 => {
                info!(
                    ?reason,
                    delivered = report.delivered,
                    failed = report.failed,
                    snoozed = report.snoozed,
                    "sync pass completed"
                );
            }
            Ok(PassOutcome::Completed(_)) => debug!(?reason, "sync pass found nothing due"),
            Ok(PassOutcome::Skipped) => debug!(?reason, "sync pass skipped"),
            Err(e) => error!(?reason, error = %e, "sync pass aborted"),
        }
    }
}
