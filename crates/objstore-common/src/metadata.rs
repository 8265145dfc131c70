//! Object metadata model
//!
//! Metadata is a value type persisted as a JSON sidecar on the local
//! backend (`<key>.metadata.json`) and as native headers on cloud
//! backends. Listing options and results also live here.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maximum number of entries in the custom metadata map
pub const CUSTOM_ENTRY_LIMIT: usize = 100;

/// Maximum length of a custom metadata key
pub const CUSTOM_KEY_MAX_LEN: usize = 128;

/// Maximum length of a custom metadata value
pub const CUSTOM_VALUE_MAX_LEN: usize = 2048;

/// Reserved custom key recording the at-rest encryption algorithm
pub const ENCRYPTION_ALGORITHM_KEY: &str = "at_rest_encryption_algorithm";

/// Reserved custom key recording the at-rest encryption key id
pub const ENCRYPTION_KEY_ID_KEY: &str = "at_rest_encryption_key_id";

/// Default page size for listings when max results is unset
pub const DEFAULT_MAX_RESULTS: usize = 1000;

/// Per-object metadata
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Metadata {
    /// MIME content type
    pub content_type: String,
    /// Content encoding (e.g. gzip)
    pub content_encoding: String,
    /// Object size in bytes
    pub size: i64,
    /// Last modification time
    pub last_modified: DateTime<Utc>,
    /// Opaque version tag; local convention `"<mtime-unix>-<size>"`
    pub etag: String,
    /// Custom key/value pairs, bounded by the metadata validator
    pub custom: HashMap<String, String>,
}

impl Metadata {
    /// Validate the custom map: entry count and per-entry key/value bounds
    pub fn validate_custom(&self) -> Result<()> {
        if self.custom.len() > CUSTOM_ENTRY_LIMIT {
            return Err(Error::invalid_metadata(format!(
                "custom metadata has {} entries, limit is {}",
                self.custom.len(),
                CUSTOM_ENTRY_LIMIT
            )));
        }
        for (k, v) in &self.custom {
            if k.is_empty() {
                return Err(Error::invalid_metadata("custom metadata key is empty"));
            }
            if k.len() > CUSTOM_KEY_MAX_LEN {
                return Err(Error::invalid_metadata(format!(
                    "custom metadata key {k:?} exceeds {CUSTOM_KEY_MAX_LEN} bytes"
                )));
            }
            if v.len() > CUSTOM_VALUE_MAX_LEN {
                return Err(Error::invalid_metadata(format!(
                    "custom metadata value for {k:?} exceeds {CUSTOM_VALUE_MAX_LEN} bytes"
                )));
            }
        }
        Ok(())
    }

    /// Check whether this metadata carries at-rest encryption bookkeeping
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.custom.contains_key(ENCRYPTION_ALGORITHM_KEY)
    }

    /// Record at-rest encryption bookkeeping in the reserved custom keys
    pub fn set_encryption(&mut self, algorithm: &str, key_id: &str) {
        self.custom
            .insert(ENCRYPTION_ALGORITHM_KEY.to_string(), algorithm.to_string());
        self.custom
            .insert(ENCRYPTION_KEY_ID_KEY.to_string(), key_id.to_string());
    }

    /// Remove at-rest encryption bookkeeping (plaintext round-trips)
    pub fn clear_encryption(&mut self) {
        self.custom.remove(ENCRYPTION_ALGORITHM_KEY);
        self.custom.remove(ENCRYPTION_KEY_ID_KEY);
    }
}

/// A (key, metadata) pair returned by listing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Object key
    pub key: String,
    /// Object metadata
    pub metadata: Metadata,
}

/// Options for paginated / delimited listing
#[derive(Clone, Debug, Default)]
pub struct ListOptions {
    /// Only keys starting with this prefix are returned (empty = all)
    pub prefix: String,
    /// Hierarchy delimiter, typically `/` (empty = flat listing)
    pub delimiter: String,
    /// Maximum objects per page; 0 means the default (1000)
    pub max_results: usize,
    /// Opaque continuation token: the last key of the previous page
    pub continue_from: Option<String>,
}

impl ListOptions {
    /// Create options listing everything under a prefix
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// The effective page size after applying the default
    #[must_use]
    pub fn effective_max(&self) -> usize {
        if self.max_results == 0 {
            DEFAULT_MAX_RESULTS
        } else {
            self.max_results
        }
    }
}

/// Result of a paginated / delimited listing
#[derive(Clone, Debug, Default)]
pub struct ListResult {
    /// Objects on this page, in walk order
    pub objects: Vec<ObjectInfo>,
    /// Directory-like prefixes collapsed by the delimiter, deduplicated
    pub common_prefixes: Vec<String>,
    /// Token to fetch the next page, if any
    pub next_token: Option<String>,
    /// True when more results remain after this page
    pub truncated: bool,
}
