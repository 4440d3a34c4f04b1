//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while converting messages to records and back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The message body has a shape that cannot be stored.
    #[error("unsupported payload: {message}")]
    UnsupportedPayload {
        /// Description of the payload problem.
        message: String,
    },

    /// The multipart boundary could not be extracted from the content type.
    #[error("no multipart boundary in content type {content_type:?}")]
    MissingBoundary {
        /// The offending content type.
        content_type: String,
    },

    /// A multipart part could not be parsed.
    #[error("malformed multipart part: {message}")]
    MalformedPart {
        /// Description of the structural error.
        message: String,
    },

    /// A stored record is missing data or holds an invalid value.
    #[error("invalid record: {message}")]
    InvalidRecord {
        /// Description of the record problem.
        message: String,
    },
}

impl CodecError {
    /// Create an unsupported payload error.
    pub fn unsupported_payload(message: impl Into<String>) -> Self {
        Self::UnsupportedPayload {
            message: message.into(),
        }
    }

    /// Create a malformed part error.
    pub fn malformed_part(message: impl Into<String>) -> Self {
        Self::MalformedPart {
            message: message.into(),
        }
    }

    /// Create an invalid record error.
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }
}
