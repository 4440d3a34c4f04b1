//! # Synclog Storage
//!
//! Named key/value stores for the synclog sync engine.
//!
//! A store holds JSON documents under string keys. The sync engine keeps
//! its queue and undo ledger in two such stores; this crate provides the
//! trait they are written against and two implementations.
//!
//! ## Design Principles
//!
//! - Stores are opened by name through a [`StoreProvider`]
//! - Writes replace whole rows
//! - Queries sort and project over `{key, metadata, value}` documents
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral queues
//! - [`FileStore`] - Append-only CBOR log, replayed on open
//!
//! ## Example
//!
//! ```rust
//! use synclog_storage::{InMemoryStoreProvider, StoreOptions, StoreProvider};
//! use serde_json::json;
//!
//! # tokio_test();
//! # fn tokio_test() {
//! let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! rt.block_on(async {
//!     let provider = InMemoryStoreProvider::new();
//!     let store = provider.open_store("queue", StoreOptions::default()).await.unwrap();
//!     store.upsert("1", json!({}), json!({"hello": "world"})).await.unwrap();
//!     assert_eq!(
//!         store.find_by_key("1").await.unwrap(),
//!         Some(json!({"hello": "world"}))
//!     );
//! });
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod store;
mod table;

pub use error::{StorageError, StorageResult};
pub use file::{FileStore, FileStoreProvider, STORE_FILE_EXTENSION};
pub use memory::{InMemoryStore, InMemoryStoreProvider};
pub use store::{FindQuery, Store, StoreOptions, StoreProvider, StoreRow};
