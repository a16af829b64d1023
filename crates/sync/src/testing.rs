//! Shared fixtures for the engine and worker tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Notify;

use localfirst_core::{CustomerId, OpId};
use localfirst_store::{
    Collection, CreateCustomerPayload, CustomerRecord, InMemoryStore, LocalStore,
    OutboxOperation, OutboxRecord, StoreResult,
};

use crate::gateway::{GatewayError, RemoteGateway, ServerAck};

/// Gateway replaying a script of outcomes, then a fallback.
#[derive(Debug)]
pub(crate) struct ScriptedGateway {
    script: Mutex<VecDeque<bool>>,
    fallback_ok: bool,
    calls: AtomicUsize,
    names: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    pub(crate) fn always_ok() -> Arc<Self> {
        Self::scripted([], true)
    }

    pub(crate) fn always_failing() -> Arc<Self> {
        Self::scripted([], false)
    }

    /// `true` entries succeed, `false` entries fail; then `fallback_ok`.
    pub(crate) fn scripted(
        script: impl IntoIterator<Item = bool>,
        fallback_ok: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback_ok,
            calls: AtomicUsize::new(0),
            names: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Customer names in the order they were submitted.
    pub(crate) fn names(&self) -> Vec<String> {
        self.names.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl RemoteGateway for ScriptedGateway {
    async fn create_customer(
        &self,
        payload: &CreateCustomerPayload,
    ) -> Result<ServerAck, GatewayError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.names.lock().unwrap().push(payload.name.clone());

        let ok = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback_ok);

        if ok {
            Ok(ServerAck {
                id: format!("srv_{call:08x}"),
            })
        } else {
            Err(GatewayError::rejected(500, Some("mock_error".to_string())))
        }
    }
}

/// Gateway that parks every call until released.
#[derive(Debug, Default)]
pub(crate) struct BlockingGateway {
    pub(crate) entered: Notify,
    pub(crate) release: Notify,
    calls: AtomicUsize,
}

impl BlockingGateway {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RemoteGateway for BlockingGateway {
    async fn create_customer(
        &self,
        _payload: &CreateCustomerPayload,
    ) -> Result<ServerAck, GatewayError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.release.notified().await;
        Ok(ServerAck {
            id: format!("srv_{call:08x}"),
        })
    }
}

/// Gateway that never answers.
#[derive(Debug, Default)]
pub(crate) struct HangingGateway;

#[async_trait::async_trait]
impl RemoteGateway for HangingGateway {
    async fn create_customer(
        &self,
        _payload: &CreateCustomerPayload,
    ) -> Result<ServerAck, GatewayError> {
        std::future::pending().await
    }
}

/// In-memory store whose outbox is cleared just as an entry is claimed,
/// as if a reset raced the worker.
#[derive(Debug, Default)]
pub(crate) struct VanishingStore {
    inner: InMemoryStore,
}

#[async_trait::async_trait]
impl LocalStore for VanishingStore {
    async fn put(&self, collection: Collection, key: &str, document: Value) -> StoreResult<()> {
        self.inner.put(collection, key, document).await
    }

    async fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Value>> {
        self.inner.get(collection, key).await
    }

    async fn update(&self, collection: Collection, key: &str, patch: Value) -> StoreResult<bool> {
        if collection == Collection::Outbox && patch["status"] == "processing" {
            self.inner.clear(Collection::Outbox).await?;
        }
        self.inner.update(collection, key, patch).await
    }

    async fn list_all(&self, collection: Collection) -> StoreResult<Vec<Value>> {
        self.inner.list_all(collection).await
    }

    async fn clear(&self, collection: Collection) -> StoreResult<()> {
        self.inner.clear(collection).await
    }
}

/// Persist a pending customer with its queued create operation.
pub(crate) async fn seed_customer(
    store: &Arc<dyn LocalStore>,
    name: &str,
    now: DateTime<Utc>,
) -> (CustomerRecord, OutboxRecord) {
    let customer = CustomerRecord::pending(CustomerId::new(), name, None, now);
    let entry = OutboxRecord::queued(
        OpId::new(),
        OutboxOperation::CreateCustomer(CreateCustomerPayload {
            temp_id: customer.id,
            name: customer.name.clone(),
            phone: None,
        }),
        now,
    );

    store.records::<CustomerRecord>().put(&customer).await.unwrap();
    store.records::<OutboxRecord>().put(&entry).await.unwrap();
    (customer, entry)
}
