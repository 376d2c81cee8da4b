//! Error types for stratadex
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Commit conflicts are deliberately absent: a failed precondition is an
//! expected outcome of optimistic concurrency and is reported as a value
//! (`CommitResult::Conflict`), never as an `Err`.

use std::io;
use thiserror::Error;

/// Result type alias for stratadex operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for stratadex
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error surfaced by a substrate backend
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A value was rejected before any substrate call was attempted
    ///
    /// Raised by collection models, index configuration checks, non-keyable
    /// index values and oversized values in plain collections.
    #[error("Validation error: {reason}")]
    Validation {
        /// Why the input was rejected
        reason: String,
    },

    /// The requested operation cannot be expressed in this context
    #[error("Unsupported operation '{operation}': {reason}")]
    Unsupported {
        /// Operation name
        operation: String,
        /// Why it is unsupported
        reason: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Stored data failed an integrity check
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// A key could not be encoded or decoded
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The substrate exceeded one of its limits or refused the request
    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    /// Transport-level fault from the underlying store
    #[error("Substrate error: {message}")]
    Substrate {
        /// Fault description
        message: String,
    },
}

impl Error {
    /// Create a validation error
    pub fn validation(reason: impl Into<String>) -> Self {
        Error::Validation {
            reason: reason.into(),
        }
    }

    /// Create an unsupported-operation error
    pub fn unsupported(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Unsupported {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Error::Serialization(msg.into())
    }

    /// Create a corruption error
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Create a substrate fault
    pub fn substrate(message: impl Into<String>) -> Self {
        Error::Substrate {
            message: message.into(),
        }
    }

    /// True if this error was raised before touching the substrate
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation { .. })
    }

    /// True for the unsupported-operation class
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::Unsupported { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_validation() {
        let err = Error::validation("age must be positive");
        let msg = err.to_string();
        assert!(msg.contains("Validation error"));
        assert!(msg.contains("age must be positive"));
        assert!(err.is_validation());
    }

    #[test]
    fn test_error_display_unsupported() {
        let err = Error::unsupported("set", "overwrite needs a read");
        let msg = err.to_string();
        assert!(msg.contains("Unsupported operation 'set'"));
        assert!(err.is_unsupported());
        assert!(!err.is_validation());
    }

    #[test]
    fn test_error_display_corruption() {
        let err = Error::corruption("digest mismatch");
        assert!(err.to_string().contains("Data corruption"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "down");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_pattern_matching() {
        let err = Error::substrate("unreachable");
        match err {
            Error::Substrate { message } => assert_eq!(message, "unreachable"),
            _ => panic!("Wrong error variant"),
        }
    }
}
