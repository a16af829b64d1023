//! Backend-agnostic Local Store contract.

use serde_json::{Map, Value};

use crate::collection::Collection;
use crate::error::{StoreError, StoreResult};

/// Keyed persistence of JSON documents per named collection.
///
/// No component outside this crate assumes anything about physical storage;
/// every state inspection goes through these operations.
///
/// Backends must make a write visible (and, for durable backends, committed)
/// before the returned future resolves.
#[async_trait::async_trait]
pub trait LocalStore: Send + Sync + core::fmt::Debug {
    /// Insert or overwrite the document stored under `key`.
    async fn put(&self, collection: Collection, key: &str, document: Value) -> StoreResult<()>;

    /// Point lookup.
    async fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Value>>;

    /// Shallow-merge `patch` (a JSON object) into the document under `key`.
    ///
    /// Returns `false` without writing when the key is absent: the record may
    /// have been cleared concurrently, and callers treat that as resolved.
    async fn update(&self, collection: Collection, key: &str, patch: Value) -> StoreResult<bool>;

    /// All documents of a collection, in insertion order.
    async fn list_all(&self, collection: Collection) -> StoreResult<Vec<Value>>;

    /// Remove every document of a collection.
    async fn clear(&self, collection: Collection) -> StoreResult<()>;
}

/// Apply a top-level merge of `patch` onto `target`.
///
/// Keys present in the patch overwrite the target's; an explicit `null`
/// clears an optional field. Nested objects are replaced, not merged.
pub(crate) fn merge_patch(
    collection: Collection,
    key: &str,
    target: &mut Value,
    patch: Value,
) -> StoreResult<()> {
    let Value::Object(fields) = patch else {
        return Err(StoreError::InvalidPatch(collection));
    };
    let Some(target) = target.as_object_mut() else {
        return Err(StoreError::NotAnObject {
            collection,
            key: key.to_string(),
        });
    };
    merge_fields(target, fields);
    Ok(())
}

fn merge_fields(target: &mut Map<String, Value>, fields: Map<String, Value>) {
    for (name, value) in fields {
        target.insert(name, value);
    }
}
