//! Undo/redo ledger for optimistic local writes.
//!
//! Each queued request may carry rows describing the local-store writes
//! made when it was queued. Undo puts the prior values back; redo
//! re-applies the new ones. Neither touches the network.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use synclog_storage::{Store, StoreOptions, StoreProvider};
use tracing::debug;

/// Kind of local write a ledger row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UndoRedoOperation {
    /// Rows were inserted or replaced.
    Upsert,
    /// Rows were deleted.
    Remove,
}

/// Before/after values of one local row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoRedoDatum {
    /// Row key in the local store.
    pub key: String,
    /// Value before the write; `None` if the write inserted the row.
    #[serde(default)]
    pub undo: Option<Value>,
    /// Value after the write; `None` if the write deleted the row.
    #[serde(default)]
    pub redo: Option<Value>,
}

impl UndoRedoDatum {
    /// Creates a datum.
    pub fn new(key: impl Into<String>, undo: Option<Value>, redo: Option<Value>) -> Self {
        Self {
            key: key.into(),
            undo,
            redo,
        }
    }
}

/// Local writes to one store that accompanied a queued request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoRedoRow {
    /// Name of the local store that was written.
    pub store_name: String,
    /// Kind of write.
    pub operation: UndoRedoOperation,
    /// Affected rows.
    pub undo_redo_data: Vec<UndoRedoDatum>,
}

impl UndoRedoRow {
    /// Creates a row for upserts into `store_name`.
    pub fn upsert(store_name: impl Into<String>, data: Vec<UndoRedoDatum>) -> Self {
        Self {
            store_name: store_name.into(),
            operation: UndoRedoOperation::Upsert,
            undo_redo_data: data,
        }
    }

    /// Creates a row for removals from `store_name`.
    pub fn remove(store_name: impl Into<String>, data: Vec<UndoRedoDatum>) -> Self {
        Self {
            store_name: store_name.into(),
            operation: UndoRedoOperation::Remove,
            undo_redo_data: data,
        }
    }
}

/// Direction in which ledger rows are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerDirection {
    /// Restore prior values.
    Undo,
    /// Re-apply new values.
    Redo,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerDocument {
    request_id: String,
    rows: Vec<UndoRedoRow>,
}

/// Value a datum should hold after applying `operation` in `direction`.
fn target_value(
    operation: UndoRedoOperation,
    direction: LedgerDirection,
    datum: &UndoRedoDatum,
) -> Option<&Value> {
    let value = match (operation, direction) {
        (_, LedgerDirection::Undo) => datum.undo.as_ref(),
        (UndoRedoOperation::Upsert, LedgerDirection::Redo) => datum.redo.as_ref(),
        (UndoRedoOperation::Remove, LedgerDirection::Redo) => None,
    };
    value.filter(|v| !v.is_null())
}

/// Ledger rows keyed by request id.
#[derive(Clone)]
pub(crate) struct UndoLedger {
    provider: Arc<dyn StoreProvider>,
    store_name: String,
}

impl UndoLedger {
    pub(crate) fn new(provider: Arc<dyn StoreProvider>, store_name: impl Into<String>) -> Self {
        Self {
            provider,
            store_name: store_name.into(),
        }
    }

    async fn store(&self) -> SyncResult<Arc<dyn Store>> {
        Ok(self
            .provider
            .open_store(&self.store_name, StoreOptions::with_index(["key"]))
            .await?)
    }

    /// Stores `rows` under `request_id`, replacing any earlier rows.
    pub(crate) async fn record(&self, request_id: &str, rows: &[UndoRedoRow]) -> SyncResult<()> {
        let document = LedgerDocument {
            request_id: request_id.to_string(),
            rows: rows.to_vec(),
        };
        self.store()
            .await?
            .upsert(request_id, json!({}), serde_json::to_value(&document)?)
            .await?;
        Ok(())
    }

    /// Returns the rows stored under `request_id`.
    pub(crate) async fn rows(&self, request_id: &str) -> SyncResult<Vec<UndoRedoRow>> {
        match self.store().await?.find_by_key(request_id).await? {
            Some(value) => {
                let document: LedgerDocument = serde_json::from_value(value)?;
                if document.request_id != request_id {
                    return Err(SyncError::InvalidRecord(format!(
                        "ledger row {request_id} belongs to request {}",
                        document.request_id
                    )));
                }
                Ok(document.rows)
            }
            None => Ok(Vec::new()),
        }
    }

    pub(crate) async fn remove(&self, request_id: &str) -> SyncResult<bool> {
        Ok(self.store().await?.remove_by_key(request_id).await?)
    }

    /// Applies the rows of `request_id`; returns false when there are none.
    pub(crate) async fn apply(&self, request_id: &str, direction: LedgerDirection) -> SyncResult<bool> {
        let mut rows = self.rows(request_id).await?;
        if rows.is_empty() {
            return Ok(false);
        }
        if direction == LedgerDirection::Undo {
            rows.reverse();
        }

        for row in &rows {
            let store = self
                .provider
                .open_store(&row.store_name, StoreOptions::default())
                .await?;
            for datum in &row.undo_redo_data {
                match target_value(row.operation, direction, datum) {
                    Some(value) => {
                        let metadata = store
                            .find_row(&datum.key)
                            .await?
                            .map_or_else(|| json!({}), |existing| existing.metadata);
                        store.upsert(&datum.key, metadata, value.clone()).await?
                    }
                    None => {
                        store.remove_by_key(&datum.key).await?;
                    }
                }
            }
        }
        debug!(request_id, ?direction, rows = rows.len(), "Applied ledger rows");
        Ok(true)
    }
}

impl fmt::Debug for UndoLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UndoLedger")
            .field("store_name", &self.store_name)
            .finish()
    }
}
