//! # Synclog Testkit
//!
//! Test utilities for the synclog sync engine.
//!
//! This crate provides:
//! - Engine fixtures over in-memory and file-backed stores
//! - Request builders for common payload shapes
//! - Transports that hold, drop or fail replies on cue
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use synclog_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn replays_queue() {
//!     let harness = TestEngine::memory();
//!     harness.insert_request(&json_post("https://api/a", &json!({})), &[]).await.unwrap();
//!     harness.sync(&SyncOptions::default()).await.unwrap();
//!     assert!(harness.queued_ids().await.is_empty());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod transports;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::transports::*;
}

pub use fixtures::*;
pub use generators::*;
pub use transports::*;
