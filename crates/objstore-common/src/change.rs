//! Changelog events
//!
//! Each mutation on a backend appends one event so replication can
//! discover dirty keys incrementally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of mutation recorded in the changelog
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    Put,
    Delete,
}

/// One append-only changelog record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Object key the mutation applied to
    pub key: String,
    /// Kind of mutation
    pub operation: ChangeOperation,
    /// When the mutation happened
    pub timestamp: DateTime<Utc>,
    /// ETag after a put (absent for deletes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Object size after a put (absent for deletes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    /// Per-policy processed marks so each policy sees each event once
    #[serde(default)]
    pub processed: HashMap<String, bool>,
}

impl ChangeEvent {
    /// Record a put
    #[must_use]
    pub fn put(key: impl Into<String>, etag: impl Into<String>, size: i64) -> Self {
        Self {
            key: key.into(),
            operation: ChangeOperation::Put,
            timestamp: Utc::now(),
            etag: Some(etag.into()),
            size: Some(size),
            processed: HashMap::new(),
        }
    }

    /// Record a delete
    #[must_use]
    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            operation: ChangeOperation::Delete,
            timestamp: Utc::now(),
            etag: None,
            size: None,
            processed: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let event = ChangeEvent::put("a/b", "123-4", 4);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["key"], "a/b");
        assert_eq!(json["operation"], "put");
        assert_eq!(json["etag"], "123-4");
        assert_eq!(json["size"], 4);

        let delete = ChangeEvent::delete("a/b");
        let json = serde_json::to_value(&delete).unwrap();
        assert_eq!(json["operation"], "delete");
        assert!(json.get("etag").is_none());
        assert!(json.get("size").is_none());
    }

    #[test]
    fn test_event_roundtrip() {
        let mut event = ChangeEvent::put("k", "e", 1);
        event.processed.insert("p1".into(), true);
        let line = serde_json::to_string(&event).unwrap();
        let back: ChangeEvent = serde_json::from_str(&line).unwrap();
        assert_eq!(back, event);
    }
}
