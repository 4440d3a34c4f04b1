//! In-memory store for testing.

use crate::error::StorageResult;
use crate::store::{FindQuery, Store, StoreOptions, StoreProvider, StoreRow};
use crate::table::Table;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// An in-memory store.
///
/// Suitable for unit tests, integration tests and ephemeral queues that do
/// not need to survive a restart.
#[derive(Debug)]
pub struct InMemoryStore {
    name: String,
    table: RwLock<Table>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(name: impl Into<String>, options: &StoreOptions) -> Self {
        Self {
            name: name.into(),
            table: RwLock::new(Table::new(options.skip_metadata)),
        }
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    /// Returns true if the store has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a copy of all rows in key order.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn rows(&self) -> Vec<StoreRow> {
        self.table.read().rows()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upsert(&self, key: &str, metadata: Value, value: Value) -> StorageResult<()> {
        self.table.write().upsert(key, metadata, value);
        Ok(())
    }

    async fn upsert_all(&self, rows: Vec<StoreRow>) -> StorageResult<()> {
        let mut table = self.table.write();
        for row in rows {
            table.upsert(&row.key, row.metadata, row.value);
        }
        Ok(())
    }

    async fn remove_by_key(&self, key: &str) -> StorageResult<bool> {
        Ok(self.table.write().remove(key))
    }

    async fn find_by_key(&self, key: &str) -> StorageResult<Option<Value>> {
        Ok(self.table.read().get(key))
    }

    async fn find_row(&self, key: &str) -> StorageResult<Option<StoreRow>> {
        Ok(self.table.read().row(key))
    }

    async fn find(&self, query: &FindQuery) -> StorageResult<Vec<Value>> {
        Ok(self.table.read().find(query))
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.table.read().keys())
    }
}

/// Opens [`InMemoryStore`]s, sharing one instance per name.
#[derive(Debug, Default)]
pub struct InMemoryStoreProvider {
    stores: RwLock<HashMap<String, Arc<InMemoryStore>>>,
}

impl InMemoryStoreProvider {
    /// Creates a provider with no stores.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the concrete store called `name`, if it has been opened.
    #[must_use]
    pub fn store(&self, name: &str) -> Option<Arc<InMemoryStore>> {
        self.stores.read().get(name).cloned()
    }

    /// Returns the names of all opened stores.
    #[must_use]
    pub fn store_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl StoreProvider for InMemoryStoreProvider {
    async fn open_store(&self, name: &str, options: StoreOptions) -> StorageResult<Arc<dyn Store>> {
        let store = self
            .stores
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(InMemoryStore::new(name, &options)))
            .clone();
        Ok(store)
    }
}
