//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while encoding or decoding keys and records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A record could not be serialized.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the failure.
        message: String,
    },

    /// A record could not be deserialized.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the failure.
        message: String,
    },

    /// A key does not carry the expected bucket prefix.
    #[error("key {key:?} is not in bucket {bucket}")]
    WrongBucket {
        /// Expected bucket prefix.
        bucket: String,
        /// Lossy rendering of the key.
        key: String,
    },

    /// An identifier is not valid UTF-8.
    #[error("invalid UTF-8 identifier")]
    InvalidUtf8,

    /// An edge identifier is not `base64(parent):base64(child)`.
    #[error("invalid edge id: {value}")]
    InvalidEdgeId {
        /// The offending identifier.
        value: String,
    },

    /// A serialized key set is malformed.
    #[error("invalid key set: {message}")]
    InvalidStructure {
        /// Description of the problem.
        message: String,
    },
}

impl CodecError {
    /// Creates an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Creates a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Creates an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Creates an invalid edge id error.
    pub fn invalid_edge_id(value: impl Into<String>) -> Self {
        Self::InvalidEdgeId {
            value: value.into(),
        }
    }
}
