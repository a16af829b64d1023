//! Customer Service: local-first create/list plus retry controls.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use localfirst_core::{CustomerId, DomainError, OpId};
use localfirst_store::{
    CreateCustomerPayload, CustomerRecord, LocalStore, OutboxOperation, OutboxRecord, SyncStatus,
};
use localfirst_sync::{SyncEngine, SyncHandle, SyncTrigger};

use crate::error::ServiceResult;

/// Input of [`CustomerService::create_customer`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CreateCustomer {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl CreateCustomer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: None,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }
}

/// Customer counts per sync status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub pending: usize,
    pub synced: usize,
    pub failed: usize,
}

impl SyncSummary {
    pub fn total(&self) -> usize {
        self.pending + self.synced + self.failed
    }
}

/// Application façade over the store and the sync engine.
#[derive(Debug, Clone)]
pub struct CustomerService {
    engine: Arc<SyncEngine>,
    trigger: Option<SyncTrigger>,
}

impl CustomerService {
    /// Service without a background worker; passes are driven by the caller.
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            engine,
            trigger: None,
        }
    }

    /// Service that wakes `worker` after every enqueue and retry reset.
    pub fn with_worker(worker: &SyncHandle) -> Self {
        Self {
            engine: worker.engine().clone(),
            trigger: Some(worker.trigger_handle()),
        }
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    fn store(&self) -> &Arc<dyn LocalStore> {
        self.engine.store()
    }

    /// Ask the worker for a pass (no-op without one).
    pub fn trigger_sync(&self) {
        if let Some(trigger) = &self.trigger {
            trigger.trigger();
        }
    }

    /// Persist a pending customer and its queued create operation.
    ///
    /// Returns once both records are stored; delivery happens in the
    /// background.
    pub async fn create_customer(&self, input: CreateCustomer) -> ServiceResult<CustomerRecord> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("customer name must not be empty").into());
        }
        let phone = input
            .phone
            .map(|phone| phone.trim().to_string())
            .filter(|phone| !phone.is_empty());

        let now = self.engine.clock().now();
        let customer = CustomerRecord::pending(CustomerId::new(), name, phone.clone(), now);
        let entry = OutboxRecord::queued(
            OpId::new(),
            OutboxOperation::CreateCustomer(CreateCustomerPayload {
                temp_id: customer.id,
                name: customer.name.clone(),
                phone,
            }),
            now,
        );

        self.store().records::<CustomerRecord>().put(&customer).await?;
        self.store().records::<OutboxRecord>().put(&entry).await?;

        info!(
            customer_id = %customer.id,
            op_id = %entry.op_id,
            "customer created locally; delivery queued"
        );
        self.trigger_sync();
        Ok(customer)
    }

    /// All customers in creation order.
    pub async fn list_customers(&self) -> ServiceResult<Vec<CustomerRecord>> {
        Ok(self.store().records::<CustomerRecord>().list_all().await?)
    }

    pub async fn get_customer(&self, id: &CustomerId) -> ServiceResult<Option<CustomerRecord>> {
        Ok(self.store().records::<CustomerRecord>().get(id).await?)
    }

    /// Every outbox entry, delivered ones included.
    pub async fn list_outbox(&self) -> ServiceResult<Vec<OutboxRecord>> {
        Ok(self.store().records::<OutboxRecord>().list_all().await?)
    }

    pub async fn sync_summary(&self) -> ServiceResult<SyncSummary> {
        let customers = self.list_customers().await?;
        Ok(customers
            .iter()
            .fold(SyncSummary::default(), |mut summary, customer| {
                match customer.sync_status {
                    SyncStatus::Pending => summary.pending += 1,
                    SyncStatus::Synced => summary.synced += 1,
                    SyncStatus::Failed => summary.failed += 1,
                }
                summary
            }))
    }

    /// Reset one failed operation (`Some`) or every failed one (`None`) for
    /// immediate redelivery. Returns how many were reset.
    pub async fn retry_sync(&self, op_id: Option<OpId>) -> ServiceResult<usize> {
        let reset = self.engine.reset_for_retry(op_id).await?;
        if reset > 0 {
            self.trigger_sync();
        }
        Ok(reset)
    }

    /// Empty both collections. Demo/test utility.
    pub async fn clear_all_for_demo(&self) -> ServiceResult<()> {
        self.store().records::<CustomerRecord>().clear().await?;
        self.store().records::<OutboxRecord>().clear().await?;
        info!("cleared local customers and outbox");
        Ok(())
    }
}
