//! # Synclog Engine
//!
//! Offline-first replay of queued HTTP mutations.
//!
//! This crate provides:
//! - A durable sync log of requests awaiting replay
//! - An undo/redo ledger for the optimistic local writes made with each
//!   queued request
//! - A replay state machine (idle → syncing → idle | failed)
//! - Interception events to skip, substitute or stop individual replays
//! - A connectivity preflight check with a timeout
//! - A transport abstraction with a `reqwest` implementation
//!
//! ## Replay model
//!
//! `sync()` reads the whole log, moves `GET`/`HEAD` requests behind every
//! mutating request, then sends entries one at a time:
//! 1. dispatch `beforeSyncRequest` (skip / stop / substitute)
//! 2. check the origin with a preflight if the preflight policy matches its URL
//! 3. send the request with the replay marker header
//! 4. dispatch `syncRequest` (stop)
//! 5. remove the entry and its ledger rows
//!
//! ## Key Invariants
//!
//! - At most one sync session runs per engine
//! - Entries are never replayed in parallel
//! - A failing entry and every entry after it stay queued
//! - Delivery is at-least-once; callers deduplicate remotely
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use synclog_codec::HttpRequest;
//! use synclog_engine::{MockTransport, SyncEngine, SyncOptions};
//! use synclog_storage::InMemoryStoreProvider;
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
//! # rt.block_on(async {
//! let engine = SyncEngine::new(Arc::new(InMemoryStoreProvider::new()), MockTransport::new());
//! engine
//!     .insert_request(&HttpRequest::post("https://api.example.com/orders"), &[])
//!     .await
//!     .unwrap();
//!
//! let result = engine.sync(&SyncOptions::default()).await.unwrap();
//! assert_eq!(result.replayed.len(), 1);
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod events;
mod http;
mod preflight;
mod state;
mod sync_log;
mod transport;
mod undo;

pub use config::{
    EngineConfig, PreflightPolicy, SyncOptions, DEFAULT_PREFLIGHT_TIMEOUT, DEFAULT_SYNC_LOG_STORE,
    DEFAULT_UNDO_REDO_STORE,
};
pub use engine::{is_replay, mark_replay, replay_order, SyncEngine, SYNC_REPLAY_HEADER};
pub use error::{ReplayFailure, SyncError, SyncResult};
pub use events::{
    listener_fn, EventDispatcher, FnListener, ListenerAction, SyncEvent, SyncEventListener,
    SyncEventType,
};
pub use http::ReqwestTransport;
pub use state::{SyncCycleResult, SyncState, SyncStats};
pub use sync_log::{QueuedRequest, RequestIdAllocator, SyncLog, SyncLogEntry};
pub use transport::{MockTransport, Transport, TransportError, TransportResult, TransportSelector};
pub use undo::{LedgerDirection, UndoRedoDatum, UndoRedoOperation, UndoRedoRow};
