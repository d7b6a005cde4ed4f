//! Async access to a shared [`Store`].
//!
//! Each call runs the blocking store operation on tokio's blocking pool and
//! resolves once it has fully completed, index updates included. Awaiting one
//! call before issuing the next preserves their order.

use std::sync::Arc;

use serde_json::Value;

use crate::storage::record::Record;
use crate::storage::schema::CollectionName;
use crate::storage::store::{CheckpointInfo, Store, StoreStats};
use crate::types::{Result, StoreError};

/// Cloneable async handle over one [`Store`].
#[derive(Clone)]
pub struct StoreHandle {
    store: Arc<Store>,
}

impl StoreHandle {
    /// Wraps an open store.
    pub fn new(store: Store) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    /// Wraps a store that is already shared.
    pub fn from_arc(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// The underlying store, for synchronous callers.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Store) -> Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|err| StoreError::Aborted(err.to_string()))?
    }

    /// See [`Store::put`].
    pub async fn put(&self, collection: CollectionName, record: Record) -> Result<()> {
        self.run(move |store| store.put(collection, record)).await
    }

    /// See [`Store::get`].
    pub async fn get(&self, collection: CollectionName, key: impl Into<String>) -> Result<Option<Record>> {
        let key = key.into();
        self.run(move |store| store.get(collection, &key)).await
    }

    /// See [`Store::delete`].
    pub async fn delete(&self, collection: CollectionName, key: impl Into<String>) -> Result<()> {
        let key = key.into();
        self.run(move |store| store.delete(collection, &key)).await
    }

    /// See [`Store::scan_all`].
    pub async fn scan_all(&self, collection: CollectionName) -> Result<Vec<Record>> {
        self.run(move |store| store.scan_all(collection)).await
    }

    /// See [`Store::scan_by_index`].
    pub async fn scan_by_index(
        &self,
        collection: CollectionName,
        index: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<Vec<Record>> {
        let index = index.into();
        let value = value.into();
        self.run(move |store| store.scan_by_index(collection, &index, value))
            .await
    }

    /// See [`Store::clear`].
    pub async fn clear(&self, collection: CollectionName) -> Result<()> {
        self.run(move |store| store.clear(collection)).await
    }

    /// See [`Store::checkpoint`].
    pub async fn checkpoint(&self) -> Result<CheckpointInfo> {
        self.run(|store| store.checkpoint()).await
    }

    /// See [`Store::stats`].
    pub async fn stats(&self) -> Result<StoreStats> {
        self.run(|store| store.stats()).await
    }
}
