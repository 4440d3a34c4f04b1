//! Store trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Options applied when a store is opened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreOptions {
    /// Document paths the caller expects to query on.
    pub index: Vec<String>,
    /// Discard row metadata on write.
    pub skip_metadata: bool,
}

impl StoreOptions {
    /// Creates options with the given index paths.
    pub fn with_index<I, S>(index: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            index: index.into_iter().map(Into::into).collect(),
            skip_metadata: false,
        }
    }

    /// Sets whether metadata is discarded.
    pub fn skip_metadata(mut self, skip: bool) -> Self {
        self.skip_metadata = skip;
        self
    }
}

/// One stored row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRow {
    /// Row key.
    pub key: String,
    /// Row metadata.
    pub metadata: Value,
    /// Row value.
    pub value: Value,
}

impl StoreRow {
    /// Creates a row with empty metadata.
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            metadata: Value::Object(Default::default()),
            value,
        }
    }
}

/// A query over the documents of a store.
///
/// Paths are dotted paths into the document `{"key", "metadata", "value"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindQuery {
    /// Ascending sort paths, applied in order.
    pub sort: Vec<String>,
    /// Paths to project; empty returns whole documents.
    pub fields: Vec<String>,
}

impl FindQuery {
    /// Creates an empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sort path.
    pub fn sort_by(mut self, path: impl Into<String>) -> Self {
        self.sort.push(path.into());
        self
    }

    /// Adds a projected path.
    pub fn field(mut self, path: impl Into<String>) -> Self {
        self.fields.push(path.into());
        self
    }
}

/// A named key/value store.
///
/// Values are JSON documents. Writes replace whole rows; there is no
/// in-place mutation.
///
/// # Invariants
///
/// - `upsert` followed by `find_by_key` on the same key returns the value
/// - `remove_by_key` on a missing key succeeds and returns `false`
/// - Implementations must be `Send + Sync` and safe for interleaved callers
#[async_trait]
pub trait Store: Send + Sync {
    /// Returns the store name.
    fn name(&self) -> &str;

    /// Inserts or replaces a row.
    async fn upsert(&self, key: &str, metadata: Value, value: Value) -> StorageResult<()>;

    /// Inserts or replaces several rows.
    async fn upsert_all(&self, rows: Vec<StoreRow>) -> StorageResult<()>;

    /// Removes a row, returning whether it existed.
    async fn remove_by_key(&self, key: &str) -> StorageResult<bool>;

    /// Returns the value stored under `key`.
    async fn find_by_key(&self, key: &str) -> StorageResult<Option<Value>>;

    /// Returns the whole row stored under `key`, metadata included.
    async fn find_row(&self, key: &str) -> StorageResult<Option<StoreRow>>;

    /// Returns documents matching the query.
    async fn find(&self, query: &FindQuery) -> StorageResult<Vec<Value>>;

    /// Returns all keys in ascending order.
    async fn keys(&self) -> StorageResult<Vec<String>>;
}

/// Opens stores by name.
///
/// Opening the same name twice yields the same shared store.
#[async_trait]
pub trait StoreProvider: Send + Sync {
    /// Opens (creating if needed) the store called `name`.
    async fn open_store(&self, name: &str, options: StoreOptions) -> StorageResult<Arc<dyn Store>>;
}
