//! Customer record: the minimal domain shape that exercises the outbox engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use localfirst_core::{CustomerId, Entity};

use crate::collection::{Collection, Record};

/// Delivery state of a customer record.
///
/// `pending -> synced` on delivery, `pending -> failed` on a failed attempt,
/// `failed -> pending` on retry reset. `synced` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Synced,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Failed => "failed",
        }
    }

    /// Whether the record still has an outstanding outbox operation.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, SyncStatus::Pending | SyncStatus::Failed)
    }
}

impl core::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A locally created customer.
///
/// Invariants: `synced` implies a `server_id` and no `error_msg`; `pending`
/// implies `retry_count == 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRecord {
    pub id: CustomerId,
    #[serde(default)]
    pub server_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sync_status: SyncStatus,
    pub retry_count: u32,
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_msg: Option<String>,
}

impl CustomerRecord {
    /// A fresh, not-yet-delivered customer.
    pub fn pending(
        id: CustomerId,
        name: impl Into<String>,
        phone: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            server_id: None,
            name: name.into(),
            phone,
            created_at: now,
            updated_at: now,
            sync_status: SyncStatus::Pending,
            retry_count: 0,
            last_sync_at: None,
            error_msg: None,
        }
    }
}

impl Entity for CustomerRecord {
    type Id = CustomerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Record for CustomerRecord {
    const COLLECTION: Collection = Collection::Customers;
    const KEY_FIELD: &'static str = "id";
    type Patch = CustomerPatch;
}

/// Partial update of a [`CustomerRecord`].
///
/// `None` leaves a field untouched; `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_status: Option<SyncStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CustomerPatch {
    /// Delivery succeeded.
    pub fn synced(server_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            server_id: Some(Some(server_id.into())),
            sync_status: Some(SyncStatus::Synced),
            retry_count: Some(0),
            last_sync_at: Some(Some(now)),
            error_msg: Some(None),
            updated_at: Some(now),
        }
    }

    /// Delivery attempt failed; `retry_count` is the already incremented count.
    pub fn failed(retry_count: u32, error: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            sync_status: Some(SyncStatus::Failed),
            retry_count: Some(retry_count),
            last_sync_at: Some(Some(now)),
            error_msg: Some(Some(error.into())),
            updated_at: Some(now),
            ..Self::default()
        }
    }

    /// Manual retry reset back to `pending`.
    pub fn reset_pending(now: DateTime<Utc>) -> Self {
        Self {
            sync_status: Some(SyncStatus::Pending),
            retry_count: Some(0),
            error_msg: Some(None),
            updated_at: Some(now),
            ..Self::default()
        }
    }
}
