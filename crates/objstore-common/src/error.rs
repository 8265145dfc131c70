//! Error types for ObjStore
//!
//! This module defines the common error types used throughout the system.

use crate::key::KeyError;
use thiserror::Error;

/// Common result type for ObjStore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for ObjStore
#[derive(Debug, Error)]
pub enum Error {
    // Validation errors
    #[error("invalid object key: {0}")]
    InvalidKey(#[from] KeyError),

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    // Storage errors
    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("metadata not found: {0}")]
    MetadataNotFound(String),

    #[error("storage path not set")]
    PathNotSet,

    #[error("archive destination is nil")]
    ArchiveDestinationNil,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Lifecycle errors
    #[error("invalid lifecycle manager type: {0}")]
    InvalidLifecycleManagerType(String),

    // Policy errors
    #[error("policy not found: {0}")]
    PolicyNotFound(String),

    #[error("policy already exists: {0}")]
    PolicyExists(String),

    // Replication errors
    #[error("backend does not support replication: {0}")]
    ReplicationNotSupported(String),

    #[error("backend not found: {0}")]
    BackendNotFound(String),

    #[error("destination type is required")]
    DestinationTypeRequired,

    // Encryption errors
    #[error("encrypter unavailable: {0}")]
    EncrypterUnavailable(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("vault not set: {0}")]
    VaultNotSet(String),

    // Call errors
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    // Internal errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create an invalid metadata error
    pub fn invalid_metadata(msg: impl Into<String>) -> Self {
        Self::InvalidMetadata(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::KeyNotFound(_)
                | Self::MetadataNotFound(_)
                | Self::PolicyNotFound(_)
                | Self::BackendNotFound(_)
        )
    }

    /// Check if this is a validation error (always surfaced, never swallowed)
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Self::InvalidKey(_)
                | Self::InvalidMetadata(_)
                | Self::InvalidLifecycleManagerType(_)
                | Self::DestinationTypeRequired
                | Self::PolicyExists(_)
        )
    }

    /// Check if this is a cancellation error
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_not_found() {
        assert!(Error::KeyNotFound("a/b".into()).is_not_found());
        assert!(Error::MetadataNotFound("a/b".into()).is_not_found());
        assert!(!Error::Cancelled.is_not_found());
    }

    #[test]
    fn test_error_invalid_argument() {
        assert!(Error::InvalidKey(KeyError::Empty).is_invalid_argument());
        assert!(Error::DestinationTypeRequired.is_invalid_argument());
        assert!(!Error::Internal("boom".into()).is_invalid_argument());
    }

    #[test]
    fn test_error_cancellation() {
        assert!(Error::Cancelled.is_cancellation());
        assert!(Error::DeadlineExceeded.is_cancellation());
        assert!(!Error::PathNotSet.is_cancellation());
    }

    #[test]
    fn test_io_not_found_is_distinct() {
        let io = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        // Raw I/O errors stay internal; backends map missing files to KeyNotFound.
        assert!(!io.is_not_found());
    }
}
