//! Error types for scopegraph core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in scopegraph core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] scopegraph_storage::StorageError),

    /// Key or record codec error.
    #[error("codec error: {0}")]
    Codec(#[from] scopegraph_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An entity required to exist is absent.
    #[error("{category} {id} not found")]
    NotFound {
        /// Category of the entity.
        category: String,
        /// Id that was looked up.
        id: String,
    },

    /// An add targeted an id that is already stored.
    #[error("{category} {id} already exists")]
    AlreadyExists {
        /// Category of the entity.
        category: String,
        /// Id that collided.
        id: String,
    },

    /// A stored record or adjacency list is inconsistent or undecodable.
    #[error("invariant violation: {message}")]
    InvariantViolation {
        /// Description of the violation.
        message: String,
    },

    /// The caller has no write-allowed scope for the target.
    #[error("access denied: {message}")]
    AccessDenied {
        /// Description of the denied operation.
        message: String,
    },

    /// The request context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// A query references unknown fields or carries unparsable values.
    #[error("invalid query: {message}")]
    InvalidQuery {
        /// Description of the problem.
        message: String,
    },

    /// Startup wiring is inconsistent (duplicate buckets, bad specs, ...).
    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        /// Description of the problem.
        message: String,
    },

    /// No index or store is registered for the category.
    #[error("unknown category: {category}")]
    UnknownCategory {
        /// Name of the category.
        category: String,
    },

    /// The commit log failed validation during replay.
    #[error("commit log corruption at offset {offset}: {message}")]
    LogCorruption {
        /// Byte offset of the bad record.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// Another process holds the graph directory lock.
    #[error("graph directory locked: another process has exclusive access")]
    DatabaseLocked,

    /// The transaction was already committed or discarded.
    #[error("transaction is no longer active")]
    TransactionClosed,

    /// A write was attempted through a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnlyTransaction,
}

impl CoreError {
    /// Creates a not found error.
    pub fn not_found(category: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            category: category.into(),
            id: id.into(),
        }
    }

    /// Creates an already exists error.
    pub fn already_exists(category: impl Into<String>, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            category: category.into(),
            id: id.into(),
        }
    }

    /// Creates an invariant violation error.
    pub fn invariant_violation(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    /// Creates an access denied error.
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied {
            message: message.into(),
        }
    }

    /// Creates an invalid query error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Creates an unknown category error.
    pub fn unknown_category(category: impl Into<String>) -> Self {
        Self::UnknownCategory {
            category: category.into(),
        }
    }

    /// Creates a log corruption error.
    pub fn log_corruption(offset: u64, message: impl Into<String>) -> Self {
        Self::LogCorruption {
            offset,
            message: message.into(),
        }
    }

    /// Whether this is a [`CoreError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether this is a [`CoreError::Cancelled`].
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
