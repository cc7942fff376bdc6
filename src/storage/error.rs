//! Storage Errors
//!
//! `TigerStyle`: Explicit error types with context.
//!
//! Not-found is never an error here: lookups return `Option`/empty `Vec`.

use thiserror::Error;

use crate::models::ModelError;

/// Errors from storage operations.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// Could not reach or open the backend
    #[error("connection error: {message}")]
    Connection {
        /// Connection error message
        message: String,
    },

    /// A query or commit failed
    #[error("query error: {message}")]
    Query {
        /// Query error message
        message: String,
    },

    /// Filesystem failure
    #[error("io error: {message}")]
    Io {
        /// Io error message
        message: String,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Persisted data could not be decoded
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// A uniqueness or foreign-key rule rejected the write
    #[error("constraint violation: {message}")]
    Constraint {
        /// Constraint error message
        message: String,
    },

    /// Internal error
    #[error("internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },
}

impl StorageError {
    /// Create a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a query error.
    #[must_use]
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    /// Create an io error.
    #[must_use]
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create a constraint error.
    #[must_use]
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint {
            message: message.into(),
        }
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a read error (wraps query error for reads).
    #[must_use]
    pub fn read(message: impl Into<String>) -> Self {
        Self::Query {
            message: format!("read: {}", message.into()),
        }
    }

    /// Create a write error (wraps query error for writes).
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::Query {
            message: format!("write: {}", message.into()),
        }
    }

    /// Whether this is a backend failure (maps to a 5xx) rather than a
    /// rejected write.
    #[must_use]
    pub fn is_backend_failure(&self) -> bool {
        !matches!(self, Self::Constraint { .. })
    }
}

impl From<ModelError> for StorageError {
    fn from(err: ModelError) -> Self {
        Self::Deserialization(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
