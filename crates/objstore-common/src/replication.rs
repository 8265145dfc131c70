//! Replication policies, results, and capability traits
//!
//! A replication policy mirrors objects under a source prefix to a
//! destination backend on a schedule. The driver trait is the capability
//! probe backends expose when they support replication.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// How object bytes travel between source and destination
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicationMode {
    /// Decrypt at the source, re-encrypt at the destination per local policy
    #[default]
    Transparent,
    /// Copy ciphertext byte-for-byte; no decrypt, no re-encrypt
    Opaque,
}

/// Encryption parameters for one role (source, destination, or backend)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionConfig {
    /// Algorithm identifier, recorded in metadata bookkeeping
    pub algorithm: String,
    /// Key identifier, recorded in metadata bookkeeping
    pub key_id: String,
}

/// Per-policy encryption plumbing
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionPolicy {
    /// Decrypt-before-transfer config for the source side
    pub source: Option<EncryptionConfig>,
    /// Encrypt-on-write config for the destination side
    pub destination: Option<EncryptionConfig>,
    /// At-rest config applied by the backend itself
    pub backend: Option<EncryptionConfig>,
}

/// A rule mirroring objects from one backend to another
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplicationPolicy {
    /// Unique policy id
    pub id: String,
    /// Name of the source backend in the facade registry
    pub source_backend: String,
    /// Settings applied to the source backend on resolution
    #[serde(default)]
    pub source_settings: HashMap<String, String>,
    /// Only keys under this prefix are replicated
    #[serde(default)]
    pub source_prefix: String,
    /// Name of the destination backend in the facade registry
    pub destination_backend: String,
    /// Settings applied to the destination backend on resolution
    #[serde(default)]
    pub destination_settings: HashMap<String, String>,
    /// Interval between sync passes
    #[serde(with = "duration_secs")]
    pub check_interval: Duration,
    /// When the last successful pass finished
    #[serde(default)]
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Disabled policies are skipped by the run loop and SyncAll
    pub enabled: bool,
    /// Transparent or opaque transfer
    #[serde(default)]
    pub mode: ReplicationMode,
    /// Encryption plumbing for this policy
    #[serde(default)]
    pub encryption: EncryptionPolicy,
    /// Delete destination objects missing from the source (opt-in)
    #[serde(default)]
    pub mirror_delete: bool,
}

/// Outcome of one sync pass for one policy
#[derive(Clone, Debug, Default)]
pub struct SyncResult {
    /// Policy the pass ran for
    pub policy_id: String,
    /// Objects copied to the destination
    pub synced: u64,
    /// Objects removed from the destination
    pub deleted: u64,
    /// Objects that failed to transfer
    pub failed: u64,
    /// Total object bytes copied
    pub bytes_total: u64,
    /// Wall-clock duration of the pass
    pub duration: Duration,
    /// Per-object error descriptions (transient failures)
    pub errors: Vec<String>,
}

/// Cumulative per-policy replication bookkeeping
#[derive(Clone, Debug, Default)]
pub struct ReplicationStatus {
    /// Total objects synced across all passes
    pub total_synced: u64,
    /// Total objects deleted across all passes
    pub total_deleted: u64,
    /// Total bytes copied across all passes
    pub total_bytes: u64,
    /// Total per-object errors across all passes
    pub total_errors: u64,
    /// When the last pass finished
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Running mean of pass durations
    pub average_duration: Duration,
    /// Number of completed passes
    pub sync_count: u64,
}

impl ReplicationStatus {
    /// Fold one sync result into the cumulative status.
    ///
    /// The average duration uses a running mean:
    /// `avg += (d - avg) / n`.
    pub fn record(&mut self, result: &SyncResult) {
        self.total_synced += result.synced;
        self.total_deleted += result.deleted;
        self.total_bytes += result.bytes_total;
        self.total_errors += result.failed;
        self.sync_count += 1;
        self.last_sync_time = Some(Utc::now());

        let avg = self.average_duration.as_secs_f64();
        let next = avg + (result.duration.as_secs_f64() - avg) / self.sync_count as f64;
        self.average_duration = Duration::from_secs_f64(next.max(0.0));
    }
}

/// The replication capability a backend may expose
#[async_trait]
pub trait ReplicationDriver: Send + Sync {
    /// Register a policy; duplicate ids are rejected
    fn add_policy(&self, policy: ReplicationPolicy) -> Result<()>;

    /// Remove a policy by id
    fn remove_policy(&self, id: &str) -> Result<()>;

    /// Fetch one policy by id
    fn policy(&self, id: &str) -> Result<ReplicationPolicy>;

    /// All registered policies
    fn policies(&self) -> Vec<ReplicationPolicy>;

    /// Run one sync pass for every enabled policy
    async fn sync_all(&self) -> Result<Vec<SyncResult>>;

    /// Run one sync pass for a single policy
    async fn sync_policy(&self, id: &str) -> Result<SyncResult>;

    /// Additional capability probe: cumulative status, when supported
    fn status_source(&self) -> Option<&dyn ReplicationStatusSource> {
        None
    }
}

/// Optional status capability on a replication driver
pub trait ReplicationStatusSource: Send + Sync {
    /// Cumulative status for one policy
    fn replication_status(&self, id: &str) -> Result<ReplicationStatus>;
}

/// Serialize a `Duration` as whole seconds (the persisted shape)
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
