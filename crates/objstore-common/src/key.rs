//! Object key validation
//!
//! Keys are validated uniformly at every entry point before a backend is
//! touched. The validator never normalises: invalid input is rejected,
//! not rewritten.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur when validating an object key
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("object key cannot be empty")]
    Empty,
    #[error("object key cannot contain a null byte")]
    NullByte,
    #[error("object key cannot contain control characters")]
    ControlCharacter,
    #[error("object key cannot be an absolute path")]
    AbsolutePath,
    #[error("object key cannot contain path traversal sequences")]
    PathTraversal,
    #[error("object key cannot contain consecutive separators")]
    DoubleSeparator,
}

/// Validate an object key.
///
/// Rejects empty keys, NUL bytes, CR/LF/TAB, leading `/`, Windows drive
/// prefixes (`C:\` or `C:/`), `..` traversal sequences, and consecutive
/// `//` or `\\` separators.
pub fn validate_key(key: &str) -> Result<(), KeyError> {
    if key.is_empty() {
        return Err(KeyError::Empty);
    }
    if key.contains('\0') {
        return Err(KeyError::NullByte);
    }
    if key.contains('\r') || key.contains('\n') || key.contains('\t') {
        return Err(KeyError::ControlCharacter);
    }
    if key.starts_with('/') || key.starts_with('\\') {
        return Err(KeyError::AbsolutePath);
    }
    // Windows drive-letter prefix, e.g. "C:\x" or "c:/x"
    let bytes = key.as_bytes();
    if bytes.len() >= 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes.len() == 2 || bytes[2] == b'\\' || bytes[2] == b'/')
    {
        return Err(KeyError::AbsolutePath);
    }
    if key.contains("..") {
        return Err(KeyError::PathTraversal);
    }
    if key.contains("//") || key.contains("\\\\") {
        return Err(KeyError::DoubleSeparator);
    }
    Ok(())
}

/// A validated object key
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Create a new object key, validating it first
    pub fn new(key: impl Into<String>) -> Result<Self, KeyError> {
        let key = key.into();
        validate_key(&key)?;
        Ok(Self(key))
    }

    /// Create without validation (internal use only)
    #[must_use]
    pub fn new_unchecked(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the key as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectKey({:?})", self.0)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_keys() {
        assert!(validate_key("file.txt").is_ok());
        assert!(validate_key("a/b/c").is_ok());
        assert!(validate_key("logs/2024/01/app.log").is_ok());
        assert!(validate_key("with spaces/and.dots").is_ok());
        assert!(validate_key("colons:are:fine").is_ok());
        assert!(validate_key("trailing/slash/").is_ok());
    }

    #[test]
    fn test_rejection_catalogue() {
        assert_eq!(validate_key(""), Err(KeyError::Empty));
        assert_eq!(validate_key("x\0y"), Err(KeyError::NullByte));
        assert_eq!(validate_key("a\nb"), Err(KeyError::ControlCharacter));
        assert_eq!(validate_key("a\tb"), Err(KeyError::ControlCharacter));
        assert_eq!(validate_key("a\rb"), Err(KeyError::ControlCharacter));
        assert_eq!(validate_key("/abs"), Err(KeyError::AbsolutePath));
        assert_eq!(validate_key("C:\\x"), Err(KeyError::AbsolutePath));
        assert_eq!(validate_key("c:/x"), Err(KeyError::AbsolutePath));
        assert_eq!(validate_key("../x"), Err(KeyError::PathTraversal));
        assert_eq!(validate_key("a/../b"), Err(KeyError::PathTraversal));
        assert_eq!(validate_key("a//b"), Err(KeyError::DoubleSeparator));
        assert_eq!(validate_key("a\\\\b"), Err(KeyError::DoubleSeparator));
    }

    #[test]
    fn test_object_key_newtype() {
        let key = ObjectKey::new("a/b/c").unwrap();
        assert_eq!(key.as_str(), "a/b/c");
        assert!(ObjectKey::new("../escape").is_err());
    }
}
