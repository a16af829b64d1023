//! In-memory Local Store for tests/dev.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::collection::Collection;
use crate::error::{StoreError, StoreResult};
use crate::store::{LocalStore, merge_patch};

#[derive(Debug, Default)]
struct CollectionData {
    next_seq: u64,
    rows: HashMap<String, (u64, Value)>,
}

/// Process-local store; contents vanish with the process.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<Collection, CollectionData>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

fn poisoned(operation: &str) -> StoreError {
    StoreError::storage(format!("in-memory store lock poisoned during {operation}"))
}

#[async_trait::async_trait]
impl LocalStore for InMemoryStore {
    async fn put(&self, collection: Collection, key: &str, document: Value) -> StoreResult<()> {
        let mut collections = self.collections.write().map_err(|_| poisoned("put"))?;
        let data = collections.entry(collection).or_default();
        match data.rows.get_mut(key) {
            Some((_, existing)) => *existing = document,
            None => {
                let seq = data.next_seq;
                data.next_seq += 1;
                data.rows.insert(key.to_string(), (seq, document));
            }
        }
        Ok(())
    }

    async fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Value>> {
        let collections = self.collections.read().map_err(|_| poisoned("get"))?;
        Ok(collections
            .get(&collection)
            .and_then(|data| data.rows.get(key))
            .map(|(_, document)| document.clone()))
    }

    async fn update(&self, collection: Collection, key: &str, patch: Value) -> StoreResult<bool> {
        let mut collections = self.collections.write().map_err(|_| poisoned("update"))?;
        let Some((_, document)) = collections
            .get_mut(&collection)
            .and_then(|data| data.rows.get_mut(key))
        else {
            return Ok(false);
        };

        // Merge on a copy so a rejected patch leaves the stored document intact.
        let mut merged = document.clone();
        merge_patch(collection, key, &mut merged, patch)?;
        *document = merged;
        Ok(true)
    }

    async fn list_all(&self, collection: Collection) -> StoreResult<Vec<Value>> {
        let collections = self.collections.read().map_err(|_| poisoned("list_all"))?;
        let Some(data) = collections.get(&collection) else {
            return Ok(Vec::new());
        };

        let mut rows: Vec<_> = data.rows.values().collect();
        rows.sort_by_key(|(seq, _)| *seq);
        Ok(rows.into_iter().map(|(_, document)| document.clone()).collect())
    }

    async fn clear(&self, collection: Collection) -> StoreResult<()> {
        let mut collections = self.collections.write().map_err(|_| poisoned("clear"))?;
        collections.remove(&collection);
        Ok(())
    }
}
