//! Outbox scheduler: drains due entries through the remote gateway.
//!
//! One [`SyncEngine`] owns the scheduler state for one store. At most one
//! pass runs at a time; a pass that finds the scheduler busy returns
//! [`PassOutcome::Skipped`] instead of waiting, because the running pass
//! re-scans before it exits.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use localfirst_core::{Clock, OpId, SystemClock};
use localfirst_store::{
    CustomerPatch, CustomerRecord, LocalStore, OutboxOperation, OutboxPatch, OutboxRecord,
    OutboxStatus, Undecodable,
};

use crate::config::SyncConfig;
use crate::connectivity::Connectivity;
use crate::error::SyncError;
use crate::gateway::{GatewayError, RemoteGateway, ServerAck};

/// Cumulative counters across all passes of one engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub passes: u64,
    pub skipped_passes: u64,
    pub delivered: u64,
    pub failed: u64,
    pub snoozed: u64,
    pub gateway_calls: u64,
}

/// What one completed pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub delivered: usize,
    pub failed: usize,
    pub snoozed: usize,
    /// The pass stopped because the client went offline.
    pub went_offline: bool,
}

impl PassReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Delivered,
    Failed,
    /// The entry was cleared before it could be claimed; nothing was sent.
    Vanished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Completed(PassReport),
    /// Another pass was already running; this trigger was coalesced into it.
    Skipped,
}

/// The outbox scheduler.
pub struct SyncEngine {
    store: Arc<dyn LocalStore>,
    gateway: Arc<dyn RemoteGateway>,
    clock: Arc<dyn Clock>,
    connectivity: Connectivity,
    config: SyncConfig,
    scheduler: tokio::sync::Mutex<()>,
    stats: Mutex<WorkerStats>,
}

impl core::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("store", &self.store)
            .field("connectivity", &self.connectivity.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn LocalStore>,
        gateway: Arc<dyn RemoteGateway>,
        connectivity: Connectivity,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            clock: Arc::new(SystemClock),
            connectivity,
            config,
            scheduler: tokio::sync::Mutex::new(()),
            stats: Mutex::new(WorkerStats::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn stats(&self) -> WorkerStats {
        *self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record_stats(&self, f: impl FnOnce(&mut WorkerStats)) {
        let mut stats = self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut stats);
    }

    /// Run one scheduler pass: deliver every due entry while online.
    ///
    /// Delivery failures are written to the records, not returned. An `Err`
    /// means the store itself failed and the pass was aborted.
    pub async fn process_outbox(&self) -> Result<PassOutcome, SyncError> {
        let Ok(_pass) = self.scheduler.try_lock() else {
            self.record_stats(|s| s.skipped_passes += 1);
            debug!("sync pass already running; trigger coalesced");
            return Ok(PassOutcome::Skipped);
        };

        let mut report = PassReport::default();
        let result = self.drain(&mut report).await;

        self.record_stats(|s| {
            s.passes += 1;
            s.delivered += report.delivered as u64;
            s.failed += report.failed as u64;
            s.snoozed += report.snoozed as u64;
        });

        result.map(|()| PassOutcome::Completed(report))
    }

    async fn drain(&self, report: &mut PassReport) -> Result<(), SyncError> {
        // Each entry is attempted at most once per pass.
        let mut visited: HashSet<OpId> = HashSet::new();

        loop {
            if !self.connectivity.is_online() {
                report.went_offline = true;
                debug!("client offline; ending sync pass");
                return Ok(());
            }

            let now = self.clock.now();
            let Some(entry) = self.next_due(now, &visited, report).await? else {
                return Ok(());
            };
            visited.insert(entry.op_id);

            if entry.status == OutboxStatus::Failed
                && self.config.retry.is_exhausted(entry.retry_count)
            {
                self.snooze(&entry, now).await?;
                report.snoozed += 1;
                continue;
            }

            match self.attempt(&entry).await? {
                Delivery::Delivered => report.delivered += 1,
                Delivery::Failed => report.failed += 1,
                Delivery::Vanished => {}
            }
        }
    }

    /// Earliest-due entry not yet visited this pass; ties go to the older entry.
    ///
    /// Documents that do not decode are marked failed and never dispatched.
    async fn next_due(
        &self,
        now: DateTime<Utc>,
        visited: &HashSet<OpId>,
        report: &mut PassReport,
    ) -> Result<Option<OutboxRecord>, SyncError> {
        let mut due = Vec::new();
        for scanned in self.store.records::<OutboxRecord>().scan().await? {
            match scanned {
                Ok(entry) if entry.is_due(now) && !visited.contains(&entry.op_id) => {
                    due.push(entry);
                }
                Ok(_) => {}
                Err(undecodable) => {
                    if self.mark_unreadable(&undecodable, now).await? {
                        report.failed += 1;
                    }
                }
            }
        }

        Ok(due
            .into_iter()
            .min_by_key(|entry| (entry.next_attempt_at, entry.created_at)))
    }

    /// Record a delivery failure on an outbox document that cannot be read.
    ///
    /// Returns `true` the first time a document is marked; already failed
    /// ones are skipped quietly.
    async fn mark_unreadable(
        &self,
        undecodable: &Undecodable,
        now: DateTime<Utc>,
    ) -> Result<bool, SyncError> {
        let Some(key) = undecodable.key.as_deref() else {
            warn!(error = %undecodable.error, "skipping outbox document without an opId");
            return Ok(false);
        };
        if undecodable.field("status") == Some(OutboxStatus::Failed.as_str()) {
            debug!(op_id = key, "skipping unreadable outbox entry");
            return Ok(false);
        }

        let message = format!("unsupported outbox entry: {}", undecodable.error);
        let marked = self
            .store
            .records::<OutboxRecord>()
            .update_key(key, &OutboxPatch::unreadable(message, now))
            .await?;
        warn!(
            op_id = key,
            kind = ?undecodable.field("type"),
            error = %undecodable.error,
            "outbox entry cannot be decoded; marked failed"
        );
        Ok(marked)
    }

    /// Decodable outbox entries matching `predicate`, in insertion order.
    async fn outbox_where(
        &self,
        predicate: impl Fn(&OutboxRecord) -> bool,
    ) -> Result<Vec<OutboxRecord>, SyncError> {
        Ok(self
            .store
            .records::<OutboxRecord>()
            .scan()
            .await?
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| predicate(entry))
            .collect())
    }

    async fn snooze(&self, entry: &OutboxRecord, now: DateTime<Utc>) -> Result<(), SyncError> {
        let until = self.config.retry.snooze_until(now);
        self.store
            .records::<OutboxRecord>()
            .update(&entry.op_id, &OutboxPatch::snoozed(until, now))
            .await?;

        warn!(
            op_id = %entry.op_id,
            retry_count = entry.retry_count,
            next_attempt_at = %until,
            "outbox entry exhausted its retries; snoozed"
        );
        Ok(())
    }

    /// Deliver one entry and record the outcome on both records.
    async fn attempt(&self, entry: &OutboxRecord) -> Result<Delivery, SyncError> {
        let outbox = self.store.records::<OutboxRecord>();
        let customers = self.store.records::<CustomerRecord>();
        let customer_id = entry.temp_id();

        let claimed = outbox
            .update(&entry.op_id, &OutboxPatch::processing(self.clock.now()))
            .await?;
        if !claimed {
            debug!(op_id = %entry.op_id, "outbox entry vanished before delivery");
            return Ok(Delivery::Vanished);
        }

        debug!(
            op_id = %entry.op_id,
            customer_id = %customer_id,
            kind = entry.operation.kind(),
            retry_count = entry.retry_count,
            "delivering outbox entry"
        );
        self.record_stats(|s| s.gateway_calls += 1);
        let result = self.dispatch(&entry.operation).await;
        let now = self.clock.now();

        match result {
            Ok(ack) => {
                info!(
                    op_id = %entry.op_id,
                    customer_id = %customer_id,
                    server_id = %ack.id,
                    "outbox entry delivered"
                );
                let found = customers
                    .update(&customer_id, &CustomerPatch::synced(ack.id, now))
                    .await?;
                if !found {
                    debug!(customer_id = %customer_id, "delivered customer no longer stored");
                }
                outbox.update(&entry.op_id, &OutboxPatch::done(now)).await?;
                Ok(Delivery::Delivered)
            }
            Err(error) => {
                let schedule = self.config.retry.on_failure(entry.retry_count, now);
                let message = error.to_string();
                warn!(
                    op_id = %entry.op_id,
                    customer_id = %customer_id,
                    retry_count = schedule.retry_count,
                    delay_ms = (schedule.next_attempt_at - now).num_milliseconds(),
                    exhausted = schedule.exhausted,
                    retriable = error.retriable(),
                    error = %message,
                    "outbox delivery failed"
                );

                customers
                    .update(
                        &customer_id,
                        &CustomerPatch::failed(schedule.retry_count, message.clone(), now),
                    )
                    .await?;
                outbox
                    .update(
                        &entry.op_id,
                        &OutboxPatch::failed(
                            schedule.retry_count,
                            schedule.next_attempt_at,
                            message,
                            now,
                        ),
                    )
                    .await?;
                Ok(Delivery::Failed)
            }
        }
    }

    async fn dispatch(&self, operation: &OutboxOperation) -> Result<ServerAck, GatewayError> {
        let call = match operation {
            OutboxOperation::CreateCustomer(payload) => self.gateway.create_customer(payload),
        };

        match tokio::time::timeout(self.config.gateway_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(self.config.gateway_timeout)),
        }
    }

    /// Manual retry reset of one failed entry (`Some`) or all of them (`None`).
    ///
    /// Waits for an in-flight pass. Entries that are not `failed` are left
    /// alone. Returns how many entries were reset.
    pub async fn reset_for_retry(&self, op_id: Option<OpId>) -> Result<usize, SyncError> {
        let _pass = self.scheduler.lock().await;

        let outbox = self.store.records::<OutboxRecord>();
        let customers = self.store.records::<CustomerRecord>();
        let now = self.clock.now();

        let targets = self
            .outbox_where(|entry| {
                entry.status == OutboxStatus::Failed && op_id.is_none_or(|id| entry.op_id == id)
            })
            .await?;

        for entry in &targets {
            outbox.update(&entry.op_id, &OutboxPatch::requeued(now)).await?;
            customers
                .update(&entry.temp_id(), &CustomerPatch::reset_pending(now))
                .await?;
        }

        if targets.is_empty() {
            debug!(op_id = ?op_id, "no failed outbox entries to reset");
        } else {
            info!(count = targets.len(), op_id = ?op_id, "reset failed outbox entries");
        }
        Ok(targets.len())
    }

    /// Requeue entries a previous process left in `processing`.
    pub async fn recover_interrupted(&self) -> Result<usize, SyncError> {
        let _pass = self.scheduler.lock().await;

        let outbox = self.store.records::<OutboxRecord>();
        let now = self.clock.now();
        let stuck = self
            .outbox_where(|entry| entry.status == OutboxStatus::Processing)
            .await?;

        for entry in &stuck {
            outbox.update(&entry.op_id, &OutboxPatch::recovered(now)).await?;
        }

        if !stuck.is_empty() {
            info!(count = stuck.len(), "requeued interrupted outbox entries");
        }
        Ok(stuck.len())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Duration as ChronoDuration;
    use localfirst_core::ManualClock;
    use localfirst_store::{InMemoryStore, SyncStatus};

    use super::*;
    use localfirst_store::Collection;
    use serde_json::json;

    use crate::testing::{
        BlockingGateway, HangingGateway, ScriptedGateway, VanishingStore, seed_customer,
    };

    struct Fixture {
        store: Arc<dyn LocalStore>,
        clock: Arc<ManualClock>,
        connectivity: Connectivity,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: InMemoryStore::arc(),
                clock: Arc::new(ManualClock::starting_now()),
                connectivity: Connectivity::online(),
            }
        }

        fn engine(&self, gateway: Arc<dyn RemoteGateway>) -> SyncEngine {
            self.engine_with(gateway, SyncConfig::default())
        }

        fn engine_with(&self, gateway: Arc<dyn RemoteGateway>, config: SyncConfig) -> SyncEngine {
            SyncEngine::new(
                self.store.clone(),
                gateway,
                self.connectivity.clone(),
                config,
            )
            .with_clock(self.clock.clone())
        }

        async fn customer(&self, id: &localfirst_core::CustomerId) -> CustomerRecord {
            self.store
                .records::<CustomerRecord>()
                .get(id)
                .await
                .unwrap()
                .unwrap()
        }

        async fn entry(&self, op_id: &OpId) -> OutboxRecord {
            self.store
                .records::<OutboxRecord>()
                .get(op_id)
                .await
                .unwrap()
                .unwrap()
        }
    }

    fn completed(outcome: PassOutcome) -> PassReport {
        match outcome {
            PassOutcome::Completed(report) => report,
            PassOutcome::Skipped => panic!("pass unexpectedly skipped"),
        }
    }

    #[tokio::test]
    async fn successful_delivery_marks_both_records() {
        let fx = Fixture::new();
        let gateway = ScriptedGateway::always_ok();
        let engine = fx.engine(gateway.clone());
        let (customer, entry) = seed_customer(&fx.store, "Acme", fx.clock.now()).await;

        let report = completed(engine.process_outbox().await.unwrap());
        assert_eq!(report.delivered, 1);

        let customer = fx.customer(&customer.id).await;
        assert_eq!(customer.sync_status, SyncStatus::Synced);
        assert!(customer.server_id.as_deref().is_some_and(|id| !id.is_empty()));
        assert_eq!(customer.retry_count, 0);
        assert!(customer.error_msg.is_none());
        assert_eq!(customer.last_sync_at, Some(fx.clock.now()));

        let entry = fx.entry(&entry.op_id).await;
        assert_eq!(entry.status, OutboxStatus::Done);
        assert!(entry.last_error.is_none());
        assert_eq!(gateway.calls(), 1);

        // Done is terminal: nothing left to deliver.
        completed(engine.process_outbox().await.unwrap());
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn five_failures_snooze_for_a_day() {
        let fx = Fixture::new();
        let gateway = ScriptedGateway::always_failing();
        let engine = fx.engine(gateway.clone());
        let (customer, entry) = seed_customer(&fx.store, "Acme", fx.clock.now()).await;

        for expected_delay_ms in [1_000, 2_000, 4_000, 8_000] {
            let report = completed(engine.process_outbox().await.unwrap());
            assert_eq!(report.failed, 1);

            let stored = fx.entry(&entry.op_id).await;
            assert_eq!(
                stored.next_attempt_at - fx.clock.now(),
                ChronoDuration::milliseconds(expected_delay_ms)
            );

            // Not due yet: a pass before the window elapses is a no-op.
            completed(engine.process_outbox().await.unwrap());
            fx.clock.advance(ChronoDuration::milliseconds(expected_delay_ms));
        }

        completed(engine.process_outbox().await.unwrap());
        assert_eq!(gateway.calls(), 5);

        let customer = fx.customer(&customer.id).await;
        assert_eq!(customer.sync_status, SyncStatus::Failed);
        assert_eq!(customer.retry_count, 5);
        assert_eq!(customer.error_msg.as_deref(), Some("mock_error"));

        let stored = fx.entry(&entry.op_id).await;
        assert_eq!(stored.status, OutboxStatus::Failed);
        assert_eq!(stored.retry_count, 5);
        assert_eq!(stored.next_attempt_at - fx.clock.now(), ChronoDuration::hours(24));
    }

    #[tokio::test]
    async fn exhausted_entry_is_resnoozed_without_a_gateway_call() {
        let fx = Fixture::new();
        let gateway = ScriptedGateway::always_failing();
        let engine = fx.engine(gateway.clone());
        let (_, entry) = seed_customer(&fx.store, "Acme", fx.clock.now()).await;

        for _ in 0..5 {
            completed(engine.process_outbox().await.unwrap());
            fx.clock.advance(ChronoDuration::seconds(30));
        }
        assert_eq!(gateway.calls(), 5);

        fx.clock.advance(ChronoDuration::hours(24));
        let report = completed(engine.process_outbox().await.unwrap());
        assert_eq!(report.snoozed, 1);
        assert_eq!(report.attempted(), 0);
        assert_eq!(gateway.calls(), 5);

        let stored = fx.entry(&entry.op_id).await;
        assert_eq!(stored.next_attempt_at - fx.clock.now(), ChronoDuration::hours(24));
        assert_eq!(engine.stats().snoozed, 1);
    }

    #[tokio::test]
    async fn two_failures_then_success() {
        let fx = Fixture::new();
        let gateway = ScriptedGateway::scripted([false, false], true);
        let engine = fx.engine(gateway.clone());
        let (customer, entry) = seed_customer(&fx.store, "Acme", fx.clock.now()).await;

        let mut retry_counts = vec![fx.customer(&customer.id).await.retry_count];
        let mut deltas = Vec::new();

        for _ in 0..3 {
            completed(engine.process_outbox().await.unwrap());
            let stored = fx.entry(&entry.op_id).await;
            retry_counts.push(fx.customer(&customer.id).await.retry_count);

            if stored.status == OutboxStatus::Failed {
                let delta = stored.next_attempt_at - fx.clock.now();
                deltas.push(delta.num_milliseconds());
                fx.clock.advance(delta);
            }
        }

        assert_eq!(retry_counts, vec![0, 1, 2, 0]);
        assert_eq!(deltas, vec![1_000, 2_000]);

        let stored = fx.entry(&entry.op_id).await;
        assert_eq!(stored.status, OutboxStatus::Done);
        assert!(stored.last_error.is_none());
        assert_eq!(fx.customer(&customer.id).await.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn offline_pass_makes_no_gateway_calls() {
        let fx = Fixture::new();
        fx.connectivity.set_offline();
        let gateway = ScriptedGateway::always_ok();
        let engine = fx.engine(gateway.clone());
        let (customer, _) = seed_customer(&fx.store, "Acme", fx.clock.now()).await;

        let report = completed(engine.process_outbox().await.unwrap());
        assert!(report.went_offline);
        assert_eq!(gateway.calls(), 0);
        assert_eq!(fx.customer(&customer.id).await.sync_status, SyncStatus::Pending);

        fx.connectivity.set_online();
        completed(engine.process_outbox().await.unwrap());
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn due_entries_go_earliest_first_then_by_creation() {
        let fx = Fixture::new();
        let gateway = ScriptedGateway::always_ok();
        let engine = fx.engine(gateway.clone());
        let t0 = fx.clock.now();

        seed_customer(&fx.store, "first", t0).await;
        seed_customer(&fx.store, "second", t0 + ChronoDuration::milliseconds(1)).await;
        let (_, early) = seed_customer(&fx.store, "early", t0).await;
        fx.store
            .records::<OutboxRecord>()
            .update(
                &early.op_id,
                &OutboxPatch::snoozed(t0 - ChronoDuration::seconds(5), t0),
            )
            .await
            .unwrap();
        fx.clock.advance(ChronoDuration::seconds(1));

        let report = completed(engine.process_outbox().await.unwrap());
        assert_eq!(report.delivered, 3);
        assert_eq!(gateway.names(), vec!["early", "first", "second"]);
    }

    #[tokio::test]
    async fn reset_all_requeues_every_failed_entry() {
        let fx = Fixture::new();
        let gateway = ScriptedGateway::scripted([false, false], true);
        let engine = fx.engine(gateway.clone());
        let (a, a_entry) = seed_customer(&fx.store, "a", fx.clock.now()).await;
        let (b, b_entry) = seed_customer(&fx.store, "b", fx.clock.now()).await;

        let report = completed(engine.process_outbox().await.unwrap());
        assert_eq!(report.failed, 2);

        let reset = engine.reset_for_retry(None).await.unwrap();
        assert_eq!(reset, 2);

        for (customer, entry) in [(&a, &a_entry), (&b, &b_entry)] {
            let stored = fx.entry(&entry.op_id).await;
            assert_eq!(stored.status, OutboxStatus::Queued);
            assert_eq!(stored.retry_count, 0);
            assert_eq!(stored.next_attempt_at, fx.clock.now());
            assert!(stored.last_error.is_none());

            let customer = fx.customer(&customer.id).await;
            assert_eq!(customer.sync_status, SyncStatus::Pending);
            assert_eq!(customer.retry_count, 0);
            assert!(customer.error_msg.is_none());
        }

        // No clock movement: the reset entries are due immediately.
        let report = completed(engine.process_outbox().await.unwrap());
        assert_eq!(report.delivered, 2);
        assert_eq!(gateway.calls(), 4);
    }

    #[tokio::test]
    async fn reset_of_single_entry_leaves_others_failed() {
        let fx = Fixture::new();
        let engine = fx.engine(ScriptedGateway::always_failing());
        let (_, a_entry) = seed_customer(&fx.store, "a", fx.clock.now()).await;
        let (_, b_entry) = seed_customer(&fx.store, "b", fx.clock.now()).await;
        completed(engine.process_outbox().await.unwrap());

        assert_eq!(engine.reset_for_retry(Some(a_entry.op_id)).await.unwrap(), 1);
        assert_eq!(fx.entry(&a_entry.op_id).await.status, OutboxStatus::Queued);
        assert_eq!(fx.entry(&b_entry.op_id).await.status, OutboxStatus::Failed);
    }

    #[tokio::test]
    async fn reset_of_queued_entry_is_a_noop() {
        let fx = Fixture::new();
        let engine = fx.engine(ScriptedGateway::always_ok());
        let (_, entry) = seed_customer(&fx.store, "a", fx.clock.now()).await;
        fx.clock.advance(ChronoDuration::seconds(10));

        assert_eq!(engine.reset_for_retry(Some(entry.op_id)).await.unwrap(), 0);
        assert_eq!(engine.reset_for_retry(None).await.unwrap(), 0);
        assert_eq!(fx.entry(&entry.op_id).await, entry);
    }

    #[tokio::test]
    async fn concurrent_trigger_is_coalesced() {
        let fx = Fixture::new();
        let gateway = Arc::new(BlockingGateway::default());
        let engine = Arc::new(fx.engine(gateway.clone()));
        seed_customer(&fx.store, "Acme", fx.clock.now()).await;

        let running = tokio::spawn({
            let engine = engine.clone();
            async move { engine.process_outbox().await }
        });
        gateway.entered.notified().await;

        for _ in 0..3 {
            assert_eq!(engine.process_outbox().await.unwrap(), PassOutcome::Skipped);
        }

        gateway.release.notify_one();
        let report = completed(running.await.unwrap().unwrap());
        assert_eq!(report.delivered, 1);
        assert_eq!(gateway.calls(), 1);

        let stats = engine.stats();
        assert_eq!(stats.passes, 1);
        assert_eq!(stats.skipped_passes, 3);
        assert_eq!(stats.gateway_calls, 1);
    }

    #[tokio::test]
    async fn hanging_gateway_times_out_as_a_failure() {
        let fx = Fixture::new();
        let config = SyncConfig::default().with_gateway_timeout(Duration::from_millis(20));
        let engine = fx.engine_with(Arc::new(HangingGateway), config);
        let (customer, entry) = seed_customer(&fx.store, "Acme", fx.clock.now()).await;

        let report = completed(engine.process_outbox().await.unwrap());
        assert_eq!(report.failed, 1);

        let stored = fx.entry(&entry.op_id).await;
        assert_eq!(stored.status, OutboxStatus::Failed);
        assert_eq!(stored.retry_count, 1);
        assert!(stored.last_error.unwrap().starts_with("gateway_timeout"));
        assert_eq!(fx.customer(&customer.id).await.sync_status, SyncStatus::Failed);
    }

    #[tokio::test]
    async fn interrupted_entries_are_requeued() {
        let fx = Fixture::new();
        let engine = fx.engine(ScriptedGateway::always_ok());
        let (_, entry) = seed_customer(&fx.store, "Acme", fx.clock.now()).await;
        fx.store
            .records::<OutboxRecord>()
            .update(&entry.op_id, &OutboxPatch::processing(fx.clock.now()))
            .await
            .unwrap();

        // Processing entries are not due.
        let report = completed(engine.process_outbox().await.unwrap());
        assert_eq!(report.attempted(), 0);

        assert_eq!(engine.recover_interrupted().await.unwrap(), 1);
        assert_eq!(fx.entry(&entry.op_id).await.status, OutboxStatus::Queued);

        let report = completed(engine.process_outbox().await.unwrap());
        assert_eq!(report.delivered, 1);
    }

    #[tokio::test]
    async fn zero_backoff_does_not_spin_within_one_pass() {
        let fx = Fixture::new();
        let gateway = ScriptedGateway::always_failing();
        let config = SyncConfig::default().with_retry_policy(crate::policy::RetryPolicy::fixed(
            5,
            Duration::ZERO,
        ));
        let engine = fx.engine_with(gateway.clone(), config);
        seed_customer(&fx.store, "Acme", fx.clock.now()).await;

        let report = completed(engine.process_outbox().await.unwrap());
        assert_eq!(report.failed, 1);
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn unreadable_entry_does_not_block_the_queue() {
        let fx = Fixture::new();
        let gateway = ScriptedGateway::always_ok();
        let engine = fx.engine(gateway.clone());
        let now = fx.clock.now();

        fx.store
            .put(
                Collection::Outbox,
                "op-unknown",
                json!({
                    "opId": "op-unknown",
                    "type": "UPDATE_CUSTOMER",
                    "payload": {"tempId": "c-1", "name": "Ghost"},
                    "status": "queued",
                    "createdAt": now,
                    "updatedAt": now,
                    "retryCount": 0,
                    "nextAttemptAt": now,
                }),
            )
            .await
            .unwrap();
        let (customer, entry) = seed_customer(&fx.store, "Acme", now).await;

        let report = completed(engine.process_outbox().await.unwrap());
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(gateway.calls(), 1);
        assert_eq!(fx.customer(&customer.id).await.sync_status, SyncStatus::Synced);
        assert_eq!(fx.entry(&entry.op_id).await.status, OutboxStatus::Done);

        let raw = fx
            .store
            .get(Collection::Outbox, "op-unknown")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(raw["status"], json!("failed"));
        assert!(
            raw["lastError"]
                .as_str()
                .is_some_and(|e| e.starts_with("unsupported outbox entry"))
        );

        // Already marked: later passes neither fail nor recount it.
        let (later, _) = seed_customer(&fx.store, "Globex", now).await;
        let report = completed(engine.process_outbox().await.unwrap());
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(fx.customer(&later.id).await.sync_status, SyncStatus::Synced);

        // Resets and recovery skip it too.
        assert_eq!(engine.reset_for_retry(None).await.unwrap(), 0);
        assert_eq!(engine.recover_interrupted().await.unwrap(), 0);
        assert_eq!(engine.stats().failed, 1);
    }

    #[tokio::test]
    async fn entry_cleared_before_claim_is_not_counted() {
        let fx = Fixture {
            store: Arc::new(VanishingStore::default()),
            ..Fixture::new()
        };
        let gateway = ScriptedGateway::always_ok();
        let engine = fx.engine(gateway.clone());
        seed_customer(&fx.store, "Acme", fx.clock.now()).await;

        let report = completed(engine.process_outbox().await.unwrap());
        assert_eq!(report, PassReport::default());
        assert_eq!(gateway.calls(), 0);

        let stats = engine.stats();
        assert_eq!(stats.passes, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.delivered, 0);
        assert_eq!(stats.gateway_calls, 0);
    }
}
