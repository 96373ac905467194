//! Error types and result aliases for warden.
//!
//! These errors describe failures of the external collaborators (object cache,
//! report store, policy config source). The engine distinguishes
//! [`Error::NotFound`] from every other variant: absence is benign and gets
//! swallowed, everything else is propagated to the caller for retry.

use std::fmt;

/// The result type used throughout warden.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in warden store and cache operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested object was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A write lost an optimistic-concurrency race.
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the conflicting write.
        message: String,
    },

    /// The operation was abandoned because cancellation fired.
    #[error("operation cancelled")]
    Cancelled,

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source cause.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a not-found error for an object of the given kind.
    #[must_use]
    pub fn not_found(kind: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::NotFound(format!("{kind} {id}"))
    }

    /// Returns true if this error signals absence of the target object.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if this error was caused by cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
