//! Lifecycle policy stores
//!
//! Two variants of the id→policy store: in-memory (policies lost on
//! restart) and persistent (JSON file in the storage root, rehydrated on
//! configure). The scan pass itself lives with the backend that owns the
//! objects being scanned.

use objstore_common::{Error, LifecyclePolicy, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default interval between lifecycle scan passes
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Which policy store variant a backend runs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LifecycleManagerKind {
    /// Policies live in memory only
    #[default]
    Memory,
    /// Policies are persisted to a file in the storage root
    Persistent,
}

impl FromStr for LifecycleManagerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "memory" => Ok(Self::Memory),
            "persistent" => Ok(Self::Persistent),
            other => Err(Error::InvalidLifecycleManagerType(other.to_string())),
        }
    }
}

/// The id→policy store behind every lifecycle engine
pub trait LifecycleManager: Send + Sync {
    /// Register a policy; duplicate ids are rejected
    fn add_policy(&self, policy: LifecyclePolicy) -> Result<()>;

    /// Remove a policy by id
    fn remove_policy(&self, id: &str) -> Result<()>;

    /// All registered policies
    fn policies(&self) -> Vec<LifecyclePolicy>;
}

/// In-memory policy store
#[derive(Default)]
pub struct MemoryLifecycleManager {
    policies: RwLock<HashMap<String, LifecyclePolicy>>,
}

impl MemoryLifecycleManager {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LifecycleManager for MemoryLifecycleManager {
    fn add_policy(&self, policy: LifecyclePolicy) -> Result<()> {
        let mut policies = self.policies.write();
        if policies.contains_key(&policy.id) {
            return Err(Error::PolicyExists(policy.id));
        }
        policies.insert(policy.id.clone(), policy);
        Ok(())
    }

    fn remove_policy(&self, id: &str) -> Result<()> {
        self.policies
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::PolicyNotFound(id.to_string()))
    }

    fn policies(&self) -> Vec<LifecyclePolicy> {
        self.policies.read().values().cloned().collect()
    }
}

/// File-backed policy store.
///
/// Add and remove persist atomically (write to a temp file, then rename);
/// `open` rehydrates from the file when it exists.
pub struct PersistentLifecycleManager {
    path: PathBuf,
    policies: RwLock<HashMap<String, LifecyclePolicy>>,
}

impl PersistentLifecycleManager {
    /// Open the store, loading any previously persisted policies
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut policies = HashMap::new();
        match std::fs::read(&path) {
            Ok(bytes) => {
                let loaded: Vec<LifecyclePolicy> = serde_json::from_slice(&bytes)
                    .map_err(|e| Error::serialization(format!("lifecycle policy file: {e}")))?;
                for policy in loaded {
                    policies.insert(policy.id.clone(), policy);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        Ok(Self {
            path,
            policies: RwLock::new(policies),
        })
    }

    /// Path of the policy file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, policies: &HashMap<String, LifecyclePolicy>) -> Result<()> {
        let mut list: Vec<&LifecyclePolicy> = policies.values().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        let bytes = serde_json::to_vec_pretty(&list)
            .map_err(|e| Error::serialization(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl LifecycleManager for PersistentLifecycleManager {
    fn add_policy(&self, policy: LifecyclePolicy) -> Result<()> {
        let mut policies = self.policies.write();
        if policies.contains_key(&policy.id) {
            return Err(Error::PolicyExists(policy.id));
        }
        policies.insert(policy.id.clone(), policy);
        self.persist(&policies)
    }

    fn remove_policy(&self, id: &str) -> Result<()> {
        let mut policies = self.policies.write();
        if policies.remove(id).is_none() {
            return Err(Error::PolicyNotFound(id.to_string()));
        }
        self.persist(&policies)
    }

    fn policies(&self) -> Vec<LifecyclePolicy> {
        self.policies.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(id: &str) -> LifecyclePolicy {
        LifecyclePolicy::delete(id, "logs/", Duration::from_secs(3600))
    }

    #[test]
    fn test_manager_kind_parse() {
        assert_eq!(
            "memory".parse::<LifecycleManagerKind>().unwrap(),
            LifecycleManagerKind::Memory
        );
        assert_eq!(
            "persistent".parse::<LifecycleManagerKind>().unwrap(),
            LifecycleManagerKind::Persistent
        );
        assert!(matches!(
            "bogus".parse::<LifecycleManagerKind>(),
            Err(Error::InvalidLifecycleManagerType(_))
        ));
    }

    #[test]
    fn test_memory_duplicate_id_rejected() {
        let manager = MemoryLifecycleManager::new();
        manager.add_policy(policy("p1")).unwrap();
        assert!(matches!(
            manager.add_policy(policy("p1")),
            Err(Error::PolicyExists(_))
        ));
        assert_eq!(manager.policies().len(), 1);
    }

    #[test]
    fn test_memory_remove_missing() {
        let manager = MemoryLifecycleManager::new();
        assert!(matches!(
            manager.remove_policy("nope"),
            Err(Error::PolicyNotFound(_))
        ));
    }

    #[test]
    fn test_persistent_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policies.json");

        let manager = PersistentLifecycleManager::open(&path).unwrap();
        manager.add_policy(policy("p1")).unwrap();
        manager.add_policy(policy("p2")).unwrap();
        assert!(path.exists());

        // A fresh instance over the same file sees both policies
        let reopened = PersistentLifecycleManager::open(&path).unwrap();
        let mut ids: Vec<String> = reopened.policies().into_iter().map(|p| p.id).collect();
        ids.sort();
        assert_eq!(ids, vec!["p1", "p2"]);

        // Removals persist too
        reopened.remove_policy("p1").unwrap();
        let reopened = PersistentLifecycleManager::open(&path).unwrap();
        let ids: Vec<String> = reopened.policies().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["p2"]);
    }
}
