//! Durable queue of requests awaiting replay.

use crate::config::EngineConfig;
use crate::error::{SyncError, SyncResult};
use crate::undo::{LedgerDirection, UndoLedger, UndoRedoRow};
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared, TryFutureExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use synclog_codec::{request_from_record, request_to_record, HttpRequest, RequestRecord};
use synclog_storage::{FindQuery, Store, StoreOptions, StoreProvider};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Hands out request ids.
///
/// Ids are the creation time in milliseconds since the Unix epoch, bumped
/// past the highest id seen when the clock has not advanced, so they are
/// strictly increasing for one allocator.
#[derive(Debug, Default)]
pub struct RequestIdAllocator {
    last: Mutex<i64>,
}

impl RequestIdAllocator {
    /// Creates an allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next id.
    pub fn next_id(&self) -> String {
        let now = Utc::now().timestamp_millis();
        let mut last = self.last.lock();
        let id = if now > *last { now } else { *last + 1 };
        *last = id;
        id.to_string()
    }

    /// Raises the floor so later ids sort after `id`.
    ///
    /// Ids that are not decimal integers are ignored.
    pub fn observe(&self, id: &str) {
        if let Ok(id) = id.parse::<i64>() {
            let mut last = self.last.lock();
            *last = (*last).max(id);
        }
    }
}

/// Orders request ids numerically.
pub(crate) fn compare_ids(a: &str, b: &str) -> std::cmp::Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn is_read_only_method(method: &str) -> bool {
    method.eq_ignore_ascii_case("GET") || method.eq_ignore_ascii_case("HEAD")
}

/// One stored mutation awaiting replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedRequest {
    /// Store key and correlation id.
    pub request_id: String,
    /// Serialized request.
    pub request: RequestRecord,
}

impl QueuedRequest {
    /// Rebuilds the live request.
    pub fn to_request(&self) -> SyncResult<HttpRequest> {
        Ok(request_from_record(&self.request)?)
    }

    /// Returns true for `GET` and `HEAD` requests.
    pub fn is_read_only(&self) -> bool {
        is_read_only_method(&self.request.method)
    }
}

/// A queued request as listed by [`SyncLog::entries`], with access to its
/// undo/redo ledger.
#[derive(Debug, Clone)]
pub struct SyncLogEntry {
    queued: QueuedRequest,
    ledger: UndoLedger,
}

impl SyncLogEntry {
    /// Returns the request id.
    pub fn request_id(&self) -> &str {
        &self.queued.request_id
    }

    /// Returns the stored record.
    pub fn record(&self) -> &RequestRecord {
        &self.queued.request
    }

    /// Returns the queued request.
    pub fn queued(&self) -> &QueuedRequest {
        &self.queued
    }

    /// Rebuilds the live request.
    pub fn to_request(&self) -> SyncResult<HttpRequest> {
        self.queued.to_request()
    }

    /// Returns true for `GET` and `HEAD` requests.
    pub fn is_read_only(&self) -> bool {
        self.queued.is_read_only()
    }

    /// Returns the ledger rows recorded with this request.
    pub async fn ledger_rows(&self) -> SyncResult<Vec<UndoRedoRow>> {
        self.ledger.rows(&self.queued.request_id).await
    }

    /// Restores the local values from before this request was queued.
    ///
    /// Returns false when the request has no ledger rows.
    pub async fn undo(&self) -> SyncResult<bool> {
        self.ledger
            .apply(&self.queued.request_id, LedgerDirection::Undo)
            .await
    }

    /// Re-applies the local values written when this request was queued.
    ///
    /// Returns false when the request has no ledger rows.
    pub async fn redo(&self) -> SyncResult<bool> {
        self.ledger
            .apply(&self.queued.request_id, LedgerDirection::Redo)
            .await
    }
}

type SharedRead = Shared<BoxFuture<'static, Result<Vec<SyncLogEntry>, Arc<SyncError>>>>;

async fn open_queue(provider: &dyn StoreProvider, name: &str) -> SyncResult<Arc<dyn Store>> {
    Ok(provider
        .open_store(name, StoreOptions::with_index(["key"]))
        .await?)
}

async fn read_entries(
    provider: Arc<dyn StoreProvider>,
    store_name: String,
    ledger: UndoLedger,
) -> SyncResult<Vec<SyncLogEntry>> {
    let store = open_queue(provider.as_ref(), &store_name).await?;
    let documents = store
        .find(&FindQuery::new().sort_by("key").field("value"))
        .await?;

    let mut entries = Vec::with_capacity(documents.len());
    for mut document in documents {
        let value = document
            .get_mut("value")
            .map(serde_json::Value::take)
            .ok_or_else(|| SyncError::InvalidRecord("sync log row without value".into()))?;
        let queued: QueuedRequest = serde_json::from_value(value)?;
        entries.push(SyncLogEntry {
            queued,
            ledger: ledger.clone(),
        });
    }
    entries.sort_by(|a, b| compare_ids(a.request_id(), b.request_id()));
    debug!(entries = entries.len(), "Read sync log");
    Ok(entries)
}

/// The sync log and its undo/redo ledger.
pub struct SyncLog {
    provider: Arc<dyn StoreProvider>,
    config: EngineConfig,
    ledger: UndoLedger,
    ids: RequestIdAllocator,
    ids_seeded: OnceCell<()>,
    in_flight: Mutex<Option<(u64, SharedRead)>>,
    reads: AtomicU64,
}

impl SyncLog {
    /// Creates a sync log over the stores named in `config`.
    pub fn new(provider: Arc<dyn StoreProvider>, config: EngineConfig) -> Self {
        let ledger = UndoLedger::new(Arc::clone(&provider), config.undo_redo_store.clone());
        Self {
            provider,
            config,
            ledger,
            ids: RequestIdAllocator::new(),
            ids_seeded: OnceCell::new(),
            in_flight: Mutex::new(None),
            reads: AtomicU64::new(0),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn queue(&self) -> SyncResult<Arc<dyn Store>> {
        open_queue(self.provider.as_ref(), &self.config.sync_log_store).await
    }

    async fn write(&self, queued: &QueuedRequest) -> SyncResult<()> {
        self.queue()
            .await?
            .upsert(&queued.request_id, json!({}), serde_json::to_value(queued)?)
            .await?;
        Ok(())
    }

    /// Returns an id no queued request holds.
    ///
    /// The allocator starts above the highest stored id, so ids handed out
    /// by an earlier process or another log on the same store are never
    /// reused.
    async fn allocate_id(&self, queue: &dyn Store) -> SyncResult<String> {
        self.ids_seeded
            .get_or_try_init(|| async {
                let keys = queue.keys().await?;
                if let Some(highest) = keys.iter().max_by(|a, b| compare_ids(a, b)) {
                    self.ids.observe(highest);
                }
                Ok::<_, SyncError>(())
            })
            .await?;

        loop {
            let id = self.ids.next_id();
            if queue.find_by_key(&id).await?.is_none() {
                return Ok(id);
            }
            debug!(request_id = %id, "Request id already queued, allocating another");
        }
    }

    /// Queues `request` with its ledger rows and returns the new request id.
    ///
    /// # Errors
    ///
    /// Fails if the request body cannot be serialized or the store fails;
    /// nothing is queued in that case.
    pub async fn insert_request(
        &self,
        request: &HttpRequest,
        undo_redo_rows: &[UndoRedoRow],
    ) -> SyncResult<String> {
        let record = request_to_record(request)?;
        let queue = self.queue().await?;
        let queued = QueuedRequest {
            request_id: self.allocate_id(queue.as_ref()).await?,
            request: record,
        };
        queue
            .upsert(&queued.request_id, json!({}), serde_json::to_value(&queued)?)
            .await?;
        if !undo_redo_rows.is_empty() {
            if let Err(e) = self.ledger.record(&queued.request_id, undo_redo_rows).await {
                if let Err(cleanup) = queue.remove_by_key(&queued.request_id).await {
                    warn!(
                        request_id = %queued.request_id,
                        error = %cleanup,
                        "Failed to unqueue request after ledger write failed"
                    );
                }
                return Err(e);
            }
        }
        debug!(
            request_id = %queued.request_id,
            method = %request.method,
            url = %request.url,
            ledger_rows = undo_redo_rows.len(),
            "Queued request"
        );
        Ok(queued.request_id)
    }

    /// Replaces the stored request for `request_id`, keeping its queue
    /// position.
    pub async fn update_request(&self, request_id: &str, request: &HttpRequest) -> SyncResult<()> {
        let queued = QueuedRequest {
            request_id: request_id.to_string(),
            request: request_to_record(request)?,
        };
        self.write(&queued).await?;
        debug!(request_id, "Updated queued request");
        Ok(())
    }

    /// Returns the queued request for `request_id`.
    pub async fn find_request(&self, request_id: &str) -> SyncResult<Option<QueuedRequest>> {
        match self.queue().await?.find_by_key(request_id).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Removes `request_id` and its ledger rows.
    ///
    /// Returns the removed request, or `None` if it was not queued.
    pub async fn remove_request(&self, request_id: &str) -> SyncResult<Option<QueuedRequest>> {
        match self.find_request(request_id).await? {
            Some(queued) => {
                self.remove_queued(&queued).await;
                Ok(Some(queued))
            }
            None => Ok(None),
        }
    }

    /// Removes a queue row and, for mutating requests, its ledger rows.
    ///
    /// Store failures are logged and swallowed. Removal is idempotent.
    pub(crate) async fn remove_queued(&self, queued: &QueuedRequest) {
        let request_id = queued.request_id.as_str();
        let removed = match self.queue().await {
            Ok(store) => store.remove_by_key(request_id).await.map_err(SyncError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = removed {
            warn!(request_id, error = %e, "Failed to remove queued request");
        }

        if !queued.is_read_only() {
            if let Err(e) = self.ledger.remove(request_id).await {
                warn!(request_id, error = %e, "Failed to remove ledger rows");
            }
        }
    }

    /// Reads every queued request in id order.
    ///
    /// Concurrent callers share one store scan.
    pub async fn entries(&self) -> SyncResult<Vec<SyncLogEntry>> {
        let (read, shared) = {
            let mut slot = self.in_flight.lock();
            match slot.as_ref() {
                Some((read, shared)) => (*read, shared.clone()),
                None => {
                    let read = self.reads.fetch_add(1, Ordering::SeqCst);
                    let shared = read_entries(
                        Arc::clone(&self.provider),
                        self.config.sync_log_store.clone(),
                        self.ledger.clone(),
                    )
                    .map_err(Arc::new)
                    .boxed()
                    .shared();
                    *slot = Some((read, shared.clone()));
                    (read, shared)
                }
            }
        };

        let result = shared.await;

        {
            let mut slot = self.in_flight.lock();
            if matches!(slot.as_ref(), Some((current, _)) if *current == read) {
                *slot = None;
            }
        }

        result.map_err(|e| Arc::try_unwrap(e).unwrap_or_else(SyncError::SyncLogRead))
    }

    /// Applies the undo rows recorded with `request_id`.
    pub async fn undo(&self, request_id: &str) -> SyncResult<bool> {
        self.ledger.apply(request_id, LedgerDirection::Undo).await
    }

    /// Applies the redo rows recorded with `request_id`.
    pub async fn redo(&self, request_id: &str) -> SyncResult<bool> {
        self.ledger.apply(request_id, LedgerDirection::Redo).await
    }

    /// Returns the ledger rows recorded with `request_id`.
    pub async fn ledger_rows(&self, request_id: &str) -> SyncResult<Vec<UndoRedoRow>> {
        self.ledger.rows(request_id).await
    }
}

impl std::fmt::Debug for SyncLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncLog")
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::undo::UndoRedoDatum;
    use synclog_codec::BodyRecord;
    use synclog_storage::{InMemoryStoreProvider, StorageError, StorageResult, StoreRow};

    fn sync_log() -> (Arc<InMemoryStoreProvider>, SyncLog) {
        let provider = Arc::new(InMemoryStoreProvider::new());
        let log = SyncLog::new(provider.clone(), EngineConfig::default());
        (provider, log)
    }

    fn ledger_row() -> UndoRedoRow {
        UndoRedoRow::upsert(
            "orders",
            vec![UndoRedoDatum::new("k", Some(json!("old")), Some(json!("new")))],
        )
    }

    #[test]
    fn ids_strictly_increase() {
        let ids = RequestIdAllocator::new();
        let mut previous = ids.next_id();
        for _ in 0..1000 {
            let next = ids.next_id();
            assert_eq!(compare_ids(&previous, &next), std::cmp::Ordering::Less);
            previous = next;
        }
    }

    #[test]
    fn observe_raises_floor() {
        let ids = RequestIdAllocator::new();
        ids.observe("99999999999999");
        assert_eq!(ids.next_id(), "100000000000000");
        ids.observe("not-a-number");
        ids.observe("5");
        assert_eq!(ids.next_id(), "100000000000001");
    }

    #[tokio::test]
    async fn logs_sharing_a_store_never_reuse_ids() {
        let provider = Arc::new(InMemoryStoreProvider::new());
        let first = SyncLog::new(provider.clone(), EngineConfig::default());
        let second = SyncLog::new(provider.clone(), EngineConfig::default());

        let mut ids = Vec::new();
        for n in 0..200 {
            let url = format!("https://a/{n}");
            ids.push(first.insert_request(&HttpRequest::post(url), &[]).await.unwrap());
        }
        let late = second
            .insert_request(&HttpRequest::post("https://a/late"), &[])
            .await
            .unwrap();
        assert!(ids
            .iter()
            .all(|id| compare_ids(id, &late) == std::cmp::Ordering::Less));

        for n in 0..20 {
            let log = if n % 2 == 0 { &first } else { &second };
            let url = format!("https://b/{n}");
            ids.push(log.insert_request(&HttpRequest::post(url), &[]).await.unwrap());
        }
        ids.push(late);

        let entries = first.entries().await.unwrap();
        assert_eq!(entries.len(), 221);
        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), ids.len());
    }

    #[tokio::test]
    async fn reopened_log_continues_after_stored_ids() {
        let provider = Arc::new(InMemoryStoreProvider::new());
        let queue = open_queue(provider.as_ref(), crate::config::DEFAULT_SYNC_LOG_STORE)
            .await
            .unwrap();
        let future = (Utc::now().timestamp_millis() + 60_000).to_string();
        let stored = QueuedRequest {
            request_id: future.clone(),
            request: request_to_record(&HttpRequest::post("https://a/1")).unwrap(),
        };
        queue
            .upsert(&future, json!({}), serde_json::to_value(&stored).unwrap())
            .await
            .unwrap();

        let log = SyncLog::new(provider, EngineConfig::default());
        let id = log
            .insert_request(&HttpRequest::post("https://a/2"), &[])
            .await
            .unwrap();
        assert_eq!(compare_ids(&future, &id), std::cmp::Ordering::Less);
        assert_eq!(log.entries().await.unwrap().len(), 2);
    }

    #[test]
    fn compare_ids_is_numeric() {
        assert_eq!(compare_ids("999", "1000"), std::cmp::Ordering::Less);
        assert_eq!(compare_ids("1000", "1000"), std::cmp::Ordering::Equal);
        assert_eq!(compare_ids("1001", "1000"), std::cmp::Ordering::Greater);
    }

    #[tokio::test]
    async fn insert_and_list_in_order() {
        let (_, log) = sync_log();
        let a = log
            .insert_request(&HttpRequest::post("https://a/1").with_body("one"), &[])
            .await
            .unwrap();
        let b = log
            .insert_request(&HttpRequest::get("https://a/2"), &[])
            .await
            .unwrap();

        let entries = log.entries().await.unwrap();
        let ids: Vec<_> = entries.iter().map(|e| e.request_id().to_string()).collect();
        assert_eq!(ids, [a, b]);
        assert_eq!(entries[0].record().body, BodyRecord::Text("one".into()));
        assert!(entries[1].is_read_only());
        assert_eq!(entries[0].to_request().unwrap().url, "https://a/1");
    }

    #[tokio::test]
    async fn stored_document_shape() {
        let (provider, log) = sync_log();
        let id = log
            .insert_request(&HttpRequest::delete("https://a/1"), &[ledger_row()])
            .await
            .unwrap();

        let queue = provider.store("syncLog").unwrap();
        let stored = queue.find_by_key(&id).await.unwrap().unwrap();
        assert_eq!(stored["requestId"], json!(id));
        assert_eq!(stored["request"]["method"], json!("DELETE"));

        let ledger = provider.store("syncLogUndoRedo").unwrap();
        let rows = ledger.find_by_key(&id).await.unwrap().unwrap();
        assert_eq!(rows["requestId"], json!(id));
        assert_eq!(rows["rows"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn insert_without_ledger_rows_writes_no_ledger() {
        let (provider, log) = sync_log();
        let id = log
            .insert_request(&HttpRequest::post("https://a/1"), &[])
            .await
            .unwrap();
        assert!(log.ledger_rows(&id).await.unwrap().is_empty());
        assert!(provider.store("syncLogUndoRedo").map_or(true, |s| s.is_empty()));
    }

    #[tokio::test]
    async fn update_keeps_position() {
        let (_, log) = sync_log();
        let first = log
            .insert_request(&HttpRequest::post("https://a/1"), &[])
            .await
            .unwrap();
        log.insert_request(&HttpRequest::post("https://a/2"), &[])
            .await
            .unwrap();

        log.update_request(&first, &HttpRequest::put("https://a/1b"))
            .await
            .unwrap();

        let entries = log.entries().await.unwrap();
        assert_eq!(entries[0].request_id(), first);
        assert_eq!(entries[0].record().method, "PUT");
        assert_eq!(entries[0].record().url, "https://a/1b");
    }

    #[tokio::test]
    async fn remove_request_returns_removed() {
        let (_, log) = sync_log();
        let id = log
            .insert_request(&HttpRequest::post("https://a/1"), &[ledger_row()])
            .await
            .unwrap();

        let removed = log.remove_request(&id).await.unwrap().unwrap();
        assert_eq!(removed.request_id, id);
        assert!(log.entries().await.unwrap().is_empty());
        assert!(log.ledger_rows(&id).await.unwrap().is_empty());

        assert!(log.remove_request(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn read_only_removal_keeps_ledger() {
        let (_, log) = sync_log();
        let id = log
            .insert_request(&HttpRequest::get("https://a/1"), &[ledger_row()])
            .await
            .unwrap();

        log.remove_request(&id).await.unwrap();
        assert_eq!(log.ledger_rows(&id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn entry_undo_redo() {
        let (provider, log) = sync_log();
        let local = provider.open_store("orders", StoreOptions::default()).await.unwrap();
        local.upsert("k", json!({}), json!("new")).await.unwrap();

        log.insert_request(&HttpRequest::post("https://a/1"), &[ledger_row()])
            .await
            .unwrap();
        let entry = log.entries().await.unwrap().remove(0);

        assert!(entry.undo().await.unwrap());
        assert_eq!(local.find_by_key("k").await.unwrap(), Some(json!("old")));
        assert!(entry.redo().await.unwrap());
        assert_eq!(local.find_by_key("k").await.unwrap(), Some(json!("new")));
        assert_eq!(entry.ledger_rows().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_reads_share_result() {
        let (_, log) = sync_log();
        log.insert_request(&HttpRequest::post("https://a/1"), &[])
            .await
            .unwrap();

        let (a, b) = tokio::join!(log.entries(), log.entries());
        assert_eq!(a.unwrap().len(), 1);
        assert_eq!(b.unwrap().len(), 1);
        assert_eq!(log.reads.load(Ordering::SeqCst), 1);

        log.entries().await.unwrap();
        assert_eq!(log.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn corrupt_row_is_reported() {
        let (provider, log) = sync_log();
        let queue = open_queue(provider.as_ref(), crate::config::DEFAULT_SYNC_LOG_STORE)
            .await
            .unwrap();
        queue.upsert("1", json!({}), json!({"bogus": true})).await.unwrap();

        assert!(matches!(
            log.entries().await,
            Err(SyncError::InvalidRecord(_))
        ));
    }

    /// A store whose removals always fail.
    struct BrokenRemovals;

    #[async_trait::async_trait]
    impl Store for BrokenRemovals {
        fn name(&self) -> &str {
            "broken"
        }
        async fn upsert(&self, _: &str, _: serde_json::Value, _: serde_json::Value) -> StorageResult<()> {
            Ok(())
        }
        async fn upsert_all(&self, _: Vec<StoreRow>) -> StorageResult<()> {
            Ok(())
        }
        async fn remove_by_key(&self, _: &str) -> StorageResult<bool> {
            Err(StorageError::Corrupted("disk on fire".into()))
        }
        async fn find_by_key(&self, _: &str) -> StorageResult<Option<serde_json::Value>> {
            Ok(None)
        }
        async fn find_row(&self, _: &str) -> StorageResult<Option<StoreRow>> {
            Ok(None)
        }
        async fn find(&self, _: &FindQuery) -> StorageResult<Vec<serde_json::Value>> {
            Ok(Vec::new())
        }
        async fn keys(&self) -> StorageResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    struct BrokenProvider;

    #[async_trait::async_trait]
    impl StoreProvider for BrokenProvider {
        async fn open_store(&self, _: &str, _: StoreOptions) -> StorageResult<Arc<dyn Store>> {
            Ok(Arc::new(BrokenRemovals))
        }
    }

    /// Delegates to memory stores but cannot open the ledger store.
    struct LedgerlessProvider(InMemoryStoreProvider);

    #[async_trait::async_trait]
    impl StoreProvider for LedgerlessProvider {
        async fn open_store(&self, name: &str, options: StoreOptions) -> StorageResult<Arc<dyn Store>> {
            if name == crate::config::DEFAULT_UNDO_REDO_STORE {
                return Err(StorageError::Corrupted("ledger unavailable".into()));
            }
            self.0.open_store(name, options).await
        }
    }

    #[tokio::test]
    async fn failed_ledger_write_unqueues_request() {
        let provider = Arc::new(LedgerlessProvider(InMemoryStoreProvider::new()));
        let log = SyncLog::new(provider.clone(), EngineConfig::default());

        let result = log
            .insert_request(&HttpRequest::post("https://a/1"), &[ledger_row()])
            .await;
        assert!(matches!(result, Err(SyncError::Storage(_))));
        assert!(log.entries().await.unwrap().is_empty());
        assert!(provider.0.store("syncLog").unwrap().is_empty());

        log.insert_request(&HttpRequest::post("https://a/2"), &[])
            .await
            .unwrap();
        assert_eq!(log.entries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn removal_failures_are_swallowed() {
        let log = SyncLog::new(Arc::new(BrokenProvider), EngineConfig::default());
        let queued = QueuedRequest {
            request_id: "1".into(),
            request: request_to_record(&HttpRequest::post("https://a/1")).unwrap(),
        };
        log.remove_queued(&queued).await;
    }
}
