//! Named collections and typed access to them.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use localfirst_core::Entity;

use crate::error::StoreResult;
use crate::store::LocalStore;

/// The independent collections kept by the Local Store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Customer records keyed by `id`.
    Customers,
    /// Outbox records keyed by `opId`.
    Outbox,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Customers, Collection::Outbox];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Customers => "customers",
            Collection::Outbox => "outbox",
        }
    }
}

impl core::fmt::Display for Collection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record type persisted in exactly one collection, keyed by its entity id.
pub trait Record: Entity + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection holding records of this type.
    const COLLECTION: Collection;

    /// Partial update accepted by [`Records::update`].
    type Patch: Serialize + Send + Sync;

    /// Document field holding the storage key.
    const KEY_FIELD: &'static str;

    /// Storage key of this record.
    fn key(&self) -> String {
        self.id().to_string()
    }
}

/// A stored document that no longer decodes as its record type.
#[derive(Debug)]
pub struct Undecodable {
    /// Storage key read from the raw document, when it has one.
    pub key: Option<String>,
    pub document: Value,
    pub error: serde_json::Error,
}

impl Undecodable {
    /// A top-level string field of the raw document.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.document.get(name).and_then(Value::as_str)
    }
}

/// Typed view over one collection of a [`LocalStore`].
pub struct Records<'a, R> {
    store: &'a dyn LocalStore,
    _record: PhantomData<fn() -> R>,
}

impl dyn LocalStore {
    /// Typed handle for the collection holding `R`.
    pub fn records<R: Record>(&self) -> Records<'_, R> {
        Records {
            store: self,
            _record: PhantomData,
        }
    }
}

impl<R: Record> Records<'_, R> {
    pub async fn put(&self, record: &R) -> StoreResult<()> {
        let document = serde_json::to_value(record)?;
        self.store.put(R::COLLECTION, &record.key(), document).await
    }

    pub async fn get(&self, id: &R::Id) -> StoreResult<Option<R>> {
        match self.store.get(R::COLLECTION, &id.to_string()).await? {
            Some(document) => Ok(Some(serde_json::from_value(document)?)),
            None => Ok(None),
        }
    }

    /// Merge `patch` into the record; `Ok(false)` when the record is absent.
    pub async fn update(&self, id: &R::Id, patch: &R::Patch) -> StoreResult<bool> {
        let patch = serde_json::to_value(patch)?;
        self.store.update(R::COLLECTION, &id.to_string(), patch).await
    }

    /// Merge `patch` into the document stored under a raw `key`.
    ///
    /// For documents whose key no longer parses as `R::Id`.
    pub async fn update_key(&self, key: &str, patch: &R::Patch) -> StoreResult<bool> {
        let patch = serde_json::to_value(patch)?;
        self.store.update(R::COLLECTION, key, patch).await
    }

    /// Every document in insertion order, decoded one at a time.
    ///
    /// A document that fails to decode is returned in place as
    /// [`Undecodable`] instead of failing the whole listing.
    pub async fn scan(&self) -> StoreResult<Vec<Result<R, Undecodable>>> {
        let documents = self.store.list_all(R::COLLECTION).await?;
        Ok(documents
            .into_iter()
            .map(|document| {
                R::deserialize(&document).map_err(|error| Undecodable {
                    key: document
                        .get(R::KEY_FIELD)
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    document,
                    error,
                })
            })
            .collect())
    }

    pub async fn list_all(&self) -> StoreResult<Vec<R>> {
        self.store
            .list_all(R::COLLECTION)
            .await?
            .into_iter()
            .map(|document| serde_json::from_value(document).map_err(Into::into))
            .collect()
    }

    /// Records matching `predicate`, in insertion order.
    pub async fn query<F>(&self, predicate: F) -> StoreResult<Vec<R>>
    where
        F: Fn(&R) -> bool + Send,
    {
        let mut records = self.list_all().await?;
        records.retain(|record| predicate(record));
        Ok(records)
    }

    pub async fn clear(&self) -> StoreResult<()> {
        self.store.clear(R::COLLECTION).await
    }
}
