use crate::store::{DocumentStore, StoreError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

type Collections = BTreeMap<String, BTreeMap<String, serde_json::Value>>;

/// A [`DocumentStore`] that keeps every collection in process memory.
///
/// Useful for unit tests and for hosts that want audit records without a
/// network store. Ids handed out by [`add`](DocumentStore::add) are
/// zero-padded counters, so iteration order matches insertion order.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<Collections>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Collections> {
        self.collections.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Snapshot of `collection` as `(id, document)` pairs in id order.
    pub fn documents(&self, collection: &str) -> Vec<(String, serde_json::Value)> {
        self.lock()
            .get(collection)
            .map(|docs| docs.iter().map(|(id, doc)| (id.clone(), doc.clone())).collect())
            .unwrap_or_default()
    }

    pub fn get(&self, collection: &str, id: &str) -> Option<serde_json::Value> {
        self.lock().get(collection).and_then(|docs| docs.get(id).cloned())
    }

    pub fn len(&self, collection: &str) -> usize {
        self.lock().get(collection).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn add(&self, collection: &str, document: serde_json::Value) -> Result<String, StoreError> {
        let id = format!("{:020}", self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock()
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), document);
        Ok(id)
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        document: serde_json::Value,
    ) -> Result<(), StoreError> {
        self.lock()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), document);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        if let Some(docs) = self.lock().get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }
}
