//! Outbox record: a durably queued remote operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use localfirst_core::{CustomerId, Entity, OpId};

use crate::collection::{Collection, Record};

/// Delivery state of an outbox entry.
///
/// `queued -> processing -> done | failed`, `failed -> queued` on reset.
/// `done` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Queued,
    Processing,
    Done,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Queued => "queued",
            OutboxStatus::Processing => "processing",
            OutboxStatus::Done => "done",
            OutboxStatus::Failed => "failed",
        }
    }
}

impl core::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body for the remote "create customer" call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCustomerPayload {
    /// Client id of the originating customer record.
    pub temp_id: CustomerId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// The operation an outbox entry replays, with its typed payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxOperation {
    CreateCustomer(CreateCustomerPayload),
}

impl OutboxOperation {
    /// Customer record this operation originates from.
    pub fn temp_id(&self) -> CustomerId {
        match self {
            OutboxOperation::CreateCustomer(payload) => payload.temp_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OutboxOperation::CreateCustomer(_) => "CREATE_CUSTOMER",
        }
    }
}

/// A queued operation and its delivery bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxRecord {
    pub op_id: OpId,
    #[serde(flatten)]
    pub operation: OutboxOperation,
    pub status: OutboxStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub retry_count: u32,
    pub next_attempt_at: DateTime<Utc>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl OutboxRecord {
    /// A new entry, eligible immediately.
    pub fn queued(op_id: OpId, operation: OutboxOperation, now: DateTime<Utc>) -> Self {
        Self {
            op_id,
            operation,
            status: OutboxStatus::Queued,
            created_at: now,
            updated_at: now,
            retry_count: 0,
            next_attempt_at: now,
            last_error: None,
        }
    }

    pub fn temp_id(&self) -> CustomerId {
        self.operation.temp_id()
    }

    /// Eligible for a delivery attempt at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, OutboxStatus::Queued | OutboxStatus::Failed)
            && self.next_attempt_at <= now
    }
}

impl Entity for OutboxRecord {
    type Id = OpId;

    fn id(&self) -> &Self::Id {
        &self.op_id
    }
}

impl Record for OutboxRecord {
    const COLLECTION: Collection = Collection::Outbox;
    const KEY_FIELD: &'static str = "opId";
    type Patch = OutboxPatch;
}

/// Partial update of an [`OutboxRecord`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OutboxStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl OutboxPatch {
    /// Picked up by the worker.
    pub fn processing(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(OutboxStatus::Processing),
            updated_at: Some(now),
            ..Self::default()
        }
    }

    /// Delivered.
    pub fn done(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(OutboxStatus::Done),
            next_attempt_at: Some(now),
            last_error: Some(None),
            updated_at: Some(now),
            ..Self::default()
        }
    }

    /// Attempt failed; `retry_count` is the already incremented count.
    pub fn failed(
        retry_count: u32,
        next_attempt_at: DateTime<Utc>,
        error: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            status: Some(OutboxStatus::Failed),
            retry_count: Some(retry_count),
            next_attempt_at: Some(next_attempt_at),
            last_error: Some(Some(error.into())),
            updated_at: Some(now),
        }
    }

    /// Push an exhausted entry out of the scheduler's way.
    pub fn snoozed(until: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            next_attempt_at: Some(until),
            updated_at: Some(now),
            ..Self::default()
        }
    }

    /// Manual retry reset: eligible immediately with a fresh attempt budget.
    pub fn requeued(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(OutboxStatus::Queued),
            retry_count: Some(0),
            next_attempt_at: Some(now),
            last_error: Some(None),
            updated_at: Some(now),
        }
    }

    /// Park an entry whose stored operation cannot be read back.
    pub fn unreadable(error: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            status: Some(OutboxStatus::Failed),
            last_error: Some(Some(error.into())),
            updated_at: Some(now),
            ..Self::default()
        }
    }

    /// Return an entry abandoned mid-delivery by a previous process.
    pub fn recovered(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(OutboxStatus::Queued),
            updated_at: Some(now),
            ..Self::default()
        }
    }
}
