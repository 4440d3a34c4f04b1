//! Error types for the sync engine.

use std::fmt;
use std::sync::Arc;
use synclog_codec::{CodecError, HttpRequest, HttpResponse};
use synclog_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Context for a queued request whose replay failed.
///
/// The failing entry and every entry after it stay queued.
#[derive(Debug, Clone)]
pub struct ReplayFailure {
    /// Error description (the response status text for HTTP failures).
    pub error: String,
    /// Id of the failing queue entry.
    pub request_id: String,
    /// The queued request, as read from the sync log.
    pub request: HttpRequest,
    /// The response, when one was received or synthesized.
    pub response: Option<HttpResponse>,
}

impl ReplayFailure {
    /// Returns the HTTP status of the failure, if a response is attached.
    pub fn status(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.status.as_u16())
    }
}

impl fmt::Display for ReplayFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "request {} ({} {}) failed: {}",
            self.request_id, self.request.method, self.request.url, self.error
        )
    }
}

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The backing store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A request could not be serialized or rebuilt.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// `sync()` was called while another sync session was running.
    #[error("sync already in progress")]
    SyncInProgress,

    /// Replaying a queued request failed.
    #[error("replay failed: {0}")]
    Replay(Box<ReplayFailure>),

    /// A URL scope or preflight pattern is not a valid regex.
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// An event type name is not recognized.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// A stored document does not have the expected shape.
    #[error("invalid sync log record: {0}")]
    InvalidRecord(String),

    /// A shared read of the sync log failed.
    #[error("sync log read failed: {0}")]
    SyncLogRead(Arc<SyncError>),
}

impl SyncError {
    /// Creates a replay failure error.
    pub fn replay(failure: ReplayFailure) -> Self {
        Self::Replay(Box::new(failure))
    }

    /// Returns the id of the queue entry this error is attached to.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            SyncError::Replay(failure) => Some(&failure.request_id),
            SyncError::SyncLogRead(inner) => inner.request_id(),
            _ => None,
        }
    }

    /// Returns the replay failure context, if any.
    pub fn replay_failure(&self) -> Option<&ReplayFailure> {
        match self {
            SyncError::Replay(failure) => Some(failure),
            SyncError::SyncLogRead(inner) => inner.replay_failure(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::InvalidRecord(err.to_string())
    }
}
