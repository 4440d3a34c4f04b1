//! Replay of the sync log against the network.

use crate::config::{EngineConfig, SyncOptions};
use crate::error::{ReplayFailure, SyncError, SyncResult};
use crate::events::{EventDispatcher, ListenerAction, SyncEvent, SyncEventListener, SyncEventType};
use crate::state::{SyncCycleResult, SyncSession, SyncState, SyncStats};
use crate::sync_log::{QueuedRequest, SyncLog, SyncLogEntry};
use crate::transport::Transport;
use crate::undo::UndoRedoRow;
use chrono::Utc;
use parking_lot::RwLock;
use regex::Regex;
use std::sync::Arc;
use std::time::Instant;
use synclog_codec::{HeaderName, HeaderValue, HttpRequest, HttpResponse, StatusCode};
use synclog_storage::StoreProvider;
use tracing::{debug, info, warn};

/// Header marking a request as sent by a sync replay.
pub const SYNC_REPLAY_HEADER: &str = "x-oracle-jscpt-sync-replay";

/// Adds (`active`) or removes the replay marker header.
pub fn mark_replay(request: &mut HttpRequest, active: bool) {
    let name = HeaderName::from_static(SYNC_REPLAY_HEADER);
    if active {
        request.headers.insert(name, HeaderValue::from_static(""));
    } else {
        request.headers.remove(name);
    }
}

/// Returns true if `request` carries the replay marker header.
pub fn is_replay(request: &HttpRequest) -> bool {
    request.headers.contains_key(SYNC_REPLAY_HEADER)
}

/// Stable partition putting reads after everything else.
pub(crate) fn reads_last<T>(items: Vec<T>, is_read: impl Fn(&T) -> bool) -> Vec<T> {
    let (reads, mut writes): (Vec<T>, Vec<T>) = items.into_iter().partition(|item| is_read(item));
    writes.extend(reads);
    writes
}

/// Orders entries for replay: mutating requests first, then `GET`/`HEAD`,
/// each group keeping its queue order.
pub fn replay_order(entries: Vec<SyncLogEntry>) -> Vec<SyncLogEntry> {
    reads_last(entries, SyncLogEntry::is_read_only)
}

/// The sync engine replays queued requests through a transport.
///
/// At most one [`SyncEngine::sync`] runs at a time. There is no retry or
/// backoff; a failed sync leaves the failing entry and everything after it
/// queued for the next call.
pub struct SyncEngine<T: Transport> {
    log: SyncLog,
    transport: Arc<T>,
    events: EventDispatcher,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
}

impl<T: Transport> SyncEngine<T> {
    /// Creates an engine with the default store names.
    pub fn new(provider: Arc<dyn StoreProvider>, transport: T) -> Self {
        Self::with_config(provider, transport, EngineConfig::default())
    }

    /// Creates an engine with explicit store names.
    pub fn with_config(provider: Arc<dyn StoreProvider>, transport: T, config: EngineConfig) -> Self {
        Self {
            log: SyncLog::new(provider, config),
            transport: Arc::new(transport),
            events: EventDispatcher::new(),
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the underlying sync log.
    pub fn log(&self) -> &SyncLog {
        &self.log
    }

    /// Returns the listener registry.
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Queues a request; see [`SyncLog::insert_request`].
    pub async fn insert_request(
        &self,
        request: &HttpRequest,
        undo_redo_rows: &[UndoRedoRow],
    ) -> SyncResult<String> {
        self.log.insert_request(request, undo_redo_rows).await
    }

    /// Removes a queued request; see [`SyncLog::remove_request`].
    pub async fn remove_request(&self, request_id: &str) -> SyncResult<Option<QueuedRequest>> {
        self.log.remove_request(request_id).await
    }

    /// Replaces a queued request in place; see [`SyncLog::update_request`].
    pub async fn update_request(&self, request_id: &str, request: &HttpRequest) -> SyncResult<()> {
        self.log.update_request(request_id, request).await
    }

    /// Lists the queue in id order; see [`SyncLog::entries`].
    pub async fn sync_log(&self) -> SyncResult<Vec<SyncLogEntry>> {
        self.log.entries().await
    }

    /// Registers an event listener.
    pub fn add_event_listener(
        &self,
        event_type: SyncEventType,
        listener: Arc<dyn SyncEventListener>,
        scope: Option<Regex>,
    ) {
        self.events.add(event_type, listener, scope);
    }

    /// Unregisters an event listener; returns false if it was not found.
    pub fn remove_event_listener(
        &self,
        event_type: SyncEventType,
        listener: &Arc<dyn SyncEventListener>,
        scope: Option<&Regex>,
    ) -> bool {
        self.events.remove(event_type, listener, scope)
    }

    /// Replays the sync log.
    ///
    /// Entries are sent one at a time in [`replay_order`]. Listeners may
    /// skip, substitute or stop at each entry. A `Stop` returned after a
    /// successful replay leaves that entry queued, so it is sent again by the
    /// next sync.
    ///
    /// # Errors
    ///
    /// - [`SyncError::SyncInProgress`] if another sync is running
    /// - [`SyncError::Replay`] when a request fails, times out its preflight
    ///   preflight or gets a status of 400 or above
    /// - storage and codec errors while reading the log
    pub async fn sync(&self, options: &SyncOptions) -> SyncResult<SyncCycleResult> {
        let mut session = SyncSession::begin(&self.state)?;
        let start = Instant::now();
        info!("Starting sync");

        let result = self.replay_all(&mut session, options).await;

        let mut stats = self.stats.write();
        stats.last_sync_time = Some(Utc::now());
        match result {
            Ok(mut cycle) => {
                cycle.duration = start.elapsed();
                stats.cycles_completed += 1;
                stats.last_error = None;
                info!(
                    replayed = cycle.replayed.len(),
                    skipped = cycle.skipped.len(),
                    stopped = cycle.was_stopped(),
                    duration = ?cycle.duration,
                    "Sync finished"
                );
                Ok(cycle)
            }
            Err(e) => {
                session.fail();
                stats.cycles_failed += 1;
                stats.last_error = Some(e.to_string());
                warn!(error = %e, request_id = e.request_id(), "Sync failed");
                Err(e)
            }
        }
    }

    async fn replay_all(
        &self,
        session: &mut SyncSession<'_>,
        options: &SyncOptions,
    ) -> SyncResult<SyncCycleResult> {
        let queue = replay_order(self.log.entries().await?);
        debug!(entries = queue.len(), "Replaying sync log");

        let mut cycle = SyncCycleResult::default();
        for entry in queue {
            let request_id = entry.request_id().to_string();
            let stored = entry.to_request()?;

            let before = SyncEvent::before_sync_request(&request_id, stored.clone());
            let mut outgoing = stored.clone();
            match self.events.dispatch(&before, Some(&stored.url)).await {
                Some(ListenerAction::Stop) => {
                    info!(request_id = %request_id, "Listener stopped sync before replay");
                    cycle.stopped_at = Some(request_id);
                    return Ok(cycle);
                }
                Some(ListenerAction::Skip) => {
                    debug!(request_id = %request_id, "Listener skipped request");
                    self.log.remove_queued(entry.queued()).await;
                    self.stats.write().requests_skipped += 1;
                    cycle.skipped.push(request_id);
                    continue;
                }
                Some(ListenerAction::Replay(substitute)) => {
                    debug!(request_id = %request_id, "Listener substituted request");
                    outgoing = substitute;
                }
                None => {}
            }

            if let Err(timeout) = session
                .checker
                .check(self.transport.as_ref(), options, &outgoing.url)
                .await
            {
                let response = HttpResponse::new(StatusCode::GATEWAY_TIMEOUT)
                    .with_status_text(format!(
                        "preflight OPTIONS request timed out after {:?}",
                        timeout.timeout
                    ))
                    .with_url(outgoing.url.clone());
                return Err(SyncError::replay(ReplayFailure {
                    error: response.status_text.clone(),
                    request_id,
                    request: stored,
                    response: Some(response),
                }));
            }

            mark_replay(&mut outgoing, true);
            debug!(request_id = %request_id, method = %outgoing.method, url = %outgoing.url, "Replaying request");
            let response = match self.transport.fetch(outgoing.clone()).await {
                Ok(response) => response,
                Err(e) => {
                    return Err(SyncError::replay(ReplayFailure {
                        error: e.to_string(),
                        request_id,
                        request: stored,
                        response: None,
                    }))
                }
            };

            if response.is_error() {
                return Err(SyncError::replay(ReplayFailure {
                    error: response.status_text.clone(),
                    request_id,
                    request: stored,
                    response: Some(response),
                }));
            }

            let after = SyncEvent::sync_request(&request_id, outgoing.clone(), response);
            if let Some(ListenerAction::Stop) = self.events.dispatch(&after, Some(&outgoing.url)).await {
                warn!(
                    request_id = %request_id,
                    "Listener stopped sync after replay; request stays queued and will be sent again"
                );
                cycle.stopped_at = Some(request_id);
                return Ok(cycle);
            }

            self.log.remove_queued(entry.queued()).await;
            self.stats.write().requests_replayed += 1;
            cycle.replayed.push(request_id);
        }

        Ok(cycle)
    }
}

impl<T: Transport> std::fmt::Debug for SyncEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("log", &self.log)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::listener_fn;
    use crate::transport::MockTransport;
    use proptest::prelude::*;
    use synclog_storage::InMemoryStoreProvider;

    fn engine() -> SyncEngine<MockTransport> {
        SyncEngine::new(Arc::new(InMemoryStoreProvider::new()), MockTransport::new())
    }

    #[test]
    fn replay_marker_header() {
        let mut request = HttpRequest::post("https://a/");
        assert!(!is_replay(&request));
        mark_replay(&mut request, true);
        assert!(is_replay(&request));
        assert_eq!(request.header(SYNC_REPLAY_HEADER), Some(""));
        mark_replay(&mut request, false);
        assert!(!is_replay(&request));
    }

    proptest! {
        #[test]
        fn reads_last_is_stable_partition(items in proptest::collection::vec((any::<bool>(), any::<u16>()), 0..40)) {
            let ordered = reads_last(items.clone(), |(read, _)| *read);

            let writes: Vec<_> = items.iter().filter(|(read, _)| !read).cloned().collect();
            let reads: Vec<_> = items.iter().filter(|(read, _)| *read).cloned().collect();
            prop_assert_eq!(&ordered[..writes.len()], &writes[..]);
            prop_assert_eq!(&ordered[writes.len()..], &reads[..]);
        }
    }

    #[tokio::test]
    async fn initial_state() {
        let engine = engine();
        assert_eq!(engine.state(), SyncState::Idle);
        assert_eq!(engine.stats().cycles_completed, 0);
    }

    #[tokio::test]
    async fn empty_log_syncs() {
        let engine = engine();
        let result = engine.sync(&SyncOptions::default()).await.unwrap();
        assert!(result.replayed.is_empty());
        assert_eq!(engine.state(), SyncState::Idle);
        assert_eq!(engine.stats().cycles_completed, 1);
        assert!(engine.stats().last_sync_time.is_some());
    }

    #[tokio::test]
    async fn replays_with_marker_header() {
        let engine = engine();
        engine
            .insert_request(&HttpRequest::post("https://a/1"), &[])
            .await
            .unwrap();

        engine.sync(&SyncOptions::default()).await.unwrap();
        let calls = engine.transport().calls();
        assert_eq!(calls.len(), 1);
        assert!(is_replay(&calls[0]));
        assert!(engine.sync_log().await.unwrap().is_empty());
        assert_eq!(engine.stats().requests_replayed, 1);
    }

    #[tokio::test]
    async fn failure_sets_failed_state() {
        let engine = engine();
        engine.transport().respond_with("https://a/1", StatusCode::BAD_REQUEST);
        let id = engine
            .insert_request(&HttpRequest::post("https://a/1"), &[])
            .await
            .unwrap();

        let err = engine.sync(&SyncOptions::default()).await.unwrap_err();
        assert_eq!(err.request_id(), Some(id.as_str()));
        let failure = err.replay_failure().unwrap();
        assert_eq!(failure.error, "Bad Request");
        assert_eq!(failure.status(), Some(400));
        assert!(!is_replay(&failure.request));

        assert_eq!(engine.state(), SyncState::Failed);
        assert_eq!(engine.stats().cycles_failed, 1);
        assert!(engine.stats().last_error.is_some());
        assert_eq!(engine.sync_log().await.unwrap().len(), 1);

        engine.transport().reset();
        engine.sync(&SyncOptions::default()).await.unwrap();
        assert_eq!(engine.state(), SyncState::Idle);
        assert!(engine.stats().last_error.is_none());
    }

    #[tokio::test]
    async fn replay_action_substitutes_request() {
        let engine = engine();
        engine
            .insert_request(&HttpRequest::post("https://a/old"), &[])
            .await
            .unwrap();
        engine.add_event_listener(
            SyncEventType::BeforeSyncRequest,
            listener_fn(|_| Some(ListenerAction::Replay(HttpRequest::put("https://a/new")))),
            None,
        );

        engine.sync(&SyncOptions::default()).await.unwrap();
        assert_eq!(engine.transport().call_log(), ["PUT https://a/new"]);
        assert!(engine.sync_log().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sync_request_event_carries_response() {
        let engine = engine();
        engine
            .insert_request(&HttpRequest::post("https://a/1"), &[])
            .await
            .unwrap();

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        engine.add_event_listener(
            SyncEventType::SyncRequest,
            listener_fn(move |event| {
                let status = event.response.as_ref().map(|r| r.status.as_u16());
                sink.lock().push((event.request_id.clone(), status));
                None
            }),
            None,
        );

        let result = engine.sync(&SyncOptions::default()).await.unwrap();
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, result.replayed[0]);
        assert_eq!(seen[0].1, Some(200));
    }

    #[tokio::test]
    async fn stop_after_replay_keeps_entry() {
        let engine = engine();
        engine
            .insert_request(&HttpRequest::post("https://a/1"), &[])
            .await
            .unwrap();
        engine.add_event_listener(
            SyncEventType::SyncRequest,
            listener_fn(|_| Some(ListenerAction::Stop)),
            None,
        );

        let result = engine.sync(&SyncOptions::default()).await.unwrap();
        assert!(result.was_stopped());
        assert_eq!(engine.transport().call_count(), 1);
        assert_eq!(engine.sync_log().await.unwrap().len(), 1);
    }
}
