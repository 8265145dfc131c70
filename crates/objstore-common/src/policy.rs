//! Lifecycle policies
//!
//! A lifecycle policy is a rule of the form "for objects under `<prefix>`
//! older than `<retention>`, perform `<action>`".

use crate::archive::Archiver;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Action a lifecycle policy performs on matching objects
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleAction {
    /// Delete the object
    Delete,
    /// Copy the object to the policy's archive destination
    Archive,
}

/// A lifecycle rule applied during periodic scans
#[derive(Clone, Serialize, Deserialize)]
pub struct LifecyclePolicy {
    /// Unique policy id (unique per backend)
    pub id: String,
    /// Object keys must start with this prefix to match
    pub prefix: String,
    /// Objects match when now − last-modified exceeds this
    #[serde(with = "duration_nanos")]
    pub retention: Duration,
    /// What to do with matching objects
    pub action: LifecycleAction,
    /// Archive destination; required iff action is archive.
    /// Runtime handle only, never persisted.
    #[serde(skip)]
    pub destination: Option<Arc<dyn Archiver>>,
}

impl LifecyclePolicy {
    /// Create a delete policy
    #[must_use]
    pub fn delete(id: impl Into<String>, prefix: impl Into<String>, retention: Duration) -> Self {
        Self {
            id: id.into(),
            prefix: prefix.into(),
            retention,
            action: LifecycleAction::Delete,
            destination: None,
        }
    }

    /// Create an archive policy with its destination
    #[must_use]
    pub fn archive(
        id: impl Into<String>,
        prefix: impl Into<String>,
        retention: Duration,
        destination: Arc<dyn Archiver>,
    ) -> Self {
        Self {
            id: id.into(),
            prefix: prefix.into(),
            retention,
            action: LifecycleAction::Archive,
            destination: Some(destination),
        }
    }
}

impl fmt::Debug for LifecyclePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecyclePolicy")
            .field("id", &self.id)
            .field("prefix", &self.prefix)
            .field("retention", &self.retention)
            .field("action", &self.action)
            .field("destination", &self.destination.is_some())
            .finish()
    }
}

/// Serialize a `Duration` as whole nanoseconds (the persisted shape)
mod duration_nanos {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let nanos = u64::deserialize(d)?;
        Ok(Duration::from_nanos(nanos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_json_shape() {
        let policy = LifecyclePolicy::delete("p1", "logs/", Duration::from_secs(24 * 3600));
        let json = serde_json::to_value(&policy).unwrap();
        assert_eq!(json["id"], "p1");
        assert_eq!(json["prefix"], "logs/");
        assert_eq!(json["action"], "delete");
        assert_eq!(json["retention"], 86_400_000_000_000_u64);

        let back: LifecyclePolicy = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, "p1");
        assert_eq!(back.retention, Duration::from_secs(24 * 3600));
        assert!(back.destination.is_none());
    }
}
