//! Replication manager
//!
//! Policy store, sync driver, and cumulative status bookkeeping. Backends
//! are resolved through the facade at sync time using the policy's backend
//! names and settings.

use crate::feed::ChangeFeed;
use async_trait::async_trait;
use chrono::Utc;
use objstore_common::{
    ChangeOperation, Error, ListOptions, ReplicationDriver, ReplicationMode, ReplicationPolicy,
    ReplicationStatus, ReplicationStatusSource, Result, SyncResult,
};
use objstore_store::{EncrypterFactory, Facade, ObjectStore, OpContext};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Mirrors objects between backends on a per-policy schedule
pub struct ReplicationManager {
    weak: Weak<Self>,
    facade: Arc<Facade>,
    policies: RwLock<HashMap<String, ReplicationPolicy>>,
    status: RwLock<HashMap<String, ReplicationStatus>>,
    feeds: RwLock<HashMap<String, Arc<dyn ChangeFeed>>>,
    backend_encrypter: RwLock<Option<Arc<dyn EncrypterFactory>>>,
    source_encrypter: RwLock<Option<Arc<dyn EncrypterFactory>>>,
    destination_encrypter: RwLock<Option<Arc<dyn EncrypterFactory>>>,
    started: AtomicBool,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl ReplicationManager {
    /// Create a manager resolving backends through the given facade
    #[must_use]
    pub fn new(facade: Arc<Facade>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            facade,
            policies: RwLock::new(HashMap::new()),
            status: RwLock::new(HashMap::new()),
            feeds: RwLock::new(HashMap::new()),
            backend_encrypter: RwLock::new(None),
            source_encrypter: RwLock::new(None),
            destination_encrypter: RwLock::new(None),
            started: AtomicBool::new(false),
            tasks: Mutex::new(HashMap::new()),
        })
    }

    /// Register a change feed for a backend, enabling incremental sync
    /// for policies whose source is that backend
    pub fn set_change_feed(&self, backend: impl Into<String>, feed: Arc<dyn ChangeFeed>) {
        self.feeds.write().insert(backend.into(), feed);
    }

    /// Encrypter factory for backend-managed at-rest encryption
    pub fn set_backend_encrypter_factory(&self, factory: Option<Arc<dyn EncrypterFactory>>) {
        *self.backend_encrypter.write() = factory;
    }

    /// Encrypter factory for decrypt-before-transfer at the source
    pub fn set_source_encrypter_factory(&self, factory: Option<Arc<dyn EncrypterFactory>>) {
        *self.source_encrypter.write() = factory;
    }

    /// Encrypter factory for encrypt-on-write at the destination
    pub fn set_destination_encrypter_factory(&self, factory: Option<Arc<dyn EncrypterFactory>>) {
        *self.destination_encrypter.write() = factory;
    }

    /// Start the per-policy tick loops. Ticks never overlap: a sync still
    /// running when the next tick fires coalesces into the following one.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let ids: Vec<String> = self.policies.read().keys().cloned().collect();
        for id in ids {
            self.spawn_policy_loop(id);
        }
    }

    fn spawn_policy_loop(&self, id: String) {
        let Some(manager) = self.weak.upgrade() else {
            return;
        };
        let Some(check_interval) = self.policies.read().get(&id).map(|p| p.check_interval) else {
            return;
        };
        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            let period = check_interval.max(Duration::from_secs(1));
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The immediate first tick would sync at startup; wait one period
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let enabled = manager.policies.read().get(&task_id).map(|p| p.enabled);
                match enabled {
                    None => break,
                    Some(false) => continue,
                    Some(true) => {}
                }
                if let Err(err) = manager.run_sync(&task_id).await {
                    tracing::warn!(policy = %task_id, error = %err, "replication pass failed");
                }
            }
        });
        self.tasks.lock().insert(id, handle);
    }

    async fn resolve(
        &self,
        name: &str,
        settings: &HashMap<String, String>,
    ) -> Result<Arc<dyn ObjectStore>> {
        let backend = self.facade.backend(name)?;
        if !settings.is_empty() {
            backend.configure(settings).await?;
        }
        Ok(backend)
    }

    fn role_factory(
        &self,
        role: &RwLock<Option<Arc<dyn EncrypterFactory>>>,
    ) -> Option<Arc<dyn EncrypterFactory>> {
        role.read().clone().or_else(|| self.backend_encrypter.read().clone())
    }

    /// One sync pass for one policy. Transient per-object errors are
    /// tallied; resolution and listing failures abort the pass.
    async fn run_sync(&self, id: &str) -> Result<SyncResult> {
        let policy = self.policy(id)?;
        let pass_started = Utc::now();
        let stopwatch = Instant::now();

        let source = self
            .resolve(&policy.source_backend, &policy.source_settings)
            .await?;
        let destination = self
            .resolve(&policy.destination_backend, &policy.destination_settings)
            .await?;

        // Mandated encryption roles need a factory before any object moves
        let source_decrypter = if policy.encryption.source.is_some() {
            Some(
                self.role_factory(&self.source_encrypter)
                    .ok_or_else(|| Error::VaultNotSet("source encrypter".into()))?,
            )
        } else {
            None
        };
        let destination_encrypter = if policy.encryption.destination.is_some() {
            Some(
                self.role_factory(&self.destination_encrypter)
                    .ok_or_else(|| Error::VaultNotSet("destination encrypter".into()))?,
            )
        } else {
            None
        };

        let mut result = SyncResult {
            policy_id: policy.id.clone(),
            ..SyncResult::default()
        };

        let feed = self.feeds.read().get(&policy.source_backend).cloned();
        match (feed, policy.last_sync_time) {
            (Some(feed), Some(since)) => {
                let events = feed.changes_since(since)?;
                // Last event per key wins; earlier states are superseded
                let mut latest: BTreeMap<String, ChangeOperation> = BTreeMap::new();
                for event in events {
                    if !event.key.starts_with(&policy.source_prefix) {
                        continue;
                    }
                    if event.processed.get(&policy.id).copied().unwrap_or(false) {
                        continue;
                    }
                    latest.insert(event.key, event.operation);
                }
                for (key, operation) in latest {
                    match operation {
                        ChangeOperation::Put => {
                            copy_object(
                                &policy,
                                source.as_ref(),
                                destination.as_ref(),
                                &key,
                                source_decrypter.as_deref(),
                                destination_encrypter.as_deref(),
                                &mut result,
                            )
                            .await;
                        }
                        ChangeOperation::Delete => {
                            if policy.mirror_delete {
                                delete_from_destination(destination.as_ref(), &key, &mut result)
                                    .await;
                            }
                        }
                    }
                }
            }
            _ => {
                self.sync_cold(
                    &policy,
                    source.as_ref(),
                    destination.as_ref(),
                    source_decrypter.as_deref(),
                    destination_encrypter.as_deref(),
                    &mut result,
                )
                .await?;
            }
        }

        result.duration = stopwatch.elapsed();
        if let Some(stored) = self.policies.write().get_mut(id) {
            stored.last_sync_time = Some(pass_started);
        }
        self.status
            .write()
            .entry(id.to_string())
            .or_default()
            .record(&result);
        tracing::debug!(
            policy = %id,
            synced = result.synced,
            deleted = result.deleted,
            failed = result.failed,
            "replication pass complete"
        );
        Ok(result)
    }

    async fn sync_cold(
        &self,
        policy: &ReplicationPolicy,
        source: &dyn ObjectStore,
        destination: &dyn ObjectStore,
        source_decrypter: Option<&dyn EncrypterFactory>,
        destination_encrypter: Option<&dyn EncrypterFactory>,
        result: &mut SyncResult,
    ) -> Result<()> {
        let ctx = OpContext::background();
        let mut source_keys: HashSet<String> = HashSet::new();
        let mut token: Option<String> = None;
        loop {
            let opts = ListOptions {
                prefix: policy.source_prefix.clone(),
                continue_from: token.clone(),
                ..ListOptions::default()
            };
            let page = source.list_with_options(&ctx, Some(opts)).await?;
            for info in &page.objects {
                source_keys.insert(info.key.clone());
                copy_object(
                    policy,
                    source,
                    destination,
                    &info.key,
                    source_decrypter,
                    destination_encrypter,
                    result,
                )
                .await;
            }
            if !page.truncated {
                break;
            }
            token = page.next_token;
            if token.is_none() {
                break;
            }
        }

        if policy.mirror_delete {
            let destination_keys = destination.list(&policy.source_prefix).await?;
            for key in destination_keys {
                if !source_keys.contains(&key) {
                    delete_from_destination(destination, &key, result).await;
                }
            }
        }
        Ok(())
    }
}

async fn copy_object(
    policy: &ReplicationPolicy,
    source: &dyn ObjectStore,
    destination: &dyn ObjectStore,
    key: &str,
    source_decrypter: Option<&dyn EncrypterFactory>,
    destination_encrypter: Option<&dyn EncrypterFactory>,
    result: &mut SyncResult,
) {
    let outcome: Result<u64> = async {
        let mut meta = source.get_metadata(key).await?;
        let mut reader = source.get(key).await?;

        match policy.mode {
            // Ciphertext travels verbatim, bookkeeping intact
            ReplicationMode::Opaque => {}
            ReplicationMode::Transparent => {
                if meta.is_encrypted() {
                    // A source backend with its own factory already
                    // decrypted inside get; otherwise the engine's
                    // source factory does it here.
                    if let Some(factory) = source_decrypter {
                        reader = factory.encrypter()?.decrypt(reader).await?;
                    }
                }
                meta.clear_encryption();
                if let Some(factory) = destination_encrypter {
                    let encrypter = factory.encrypter()?;
                    reader = encrypter.encrypt(reader).await?;
                    meta.set_encryption(encrypter.algorithm(), encrypter.key_id());
                }
            }
        }

        let bytes = u64::try_from(meta.size).unwrap_or(0);
        destination
            .put_with_metadata(&OpContext::background(), key, reader, Some(meta))
            .await?;
        Ok(bytes)
    }
    .await;

    match outcome {
        Ok(bytes) => {
            result.synced += 1;
            result.bytes_total += bytes;
        }
        Err(err) => {
            result.failed += 1;
            result.errors.push(format!("{key}: {err}"));
        }
    }
}

async fn delete_from_destination(
    destination: &dyn ObjectStore,
    key: &str,
    result: &mut SyncResult,
) {
    match destination.delete(key).await {
        Ok(()) => result.deleted += 1,
        // Already absent is the desired end state
        Err(err) if err.is_not_found() => {}
        Err(err) => {
            result.failed += 1;
            result.errors.push(format!("{key}: {err}"));
        }
    }
}

#[async_trait]
impl ReplicationDriver for ReplicationManager {
    fn add_policy(&self, policy: ReplicationPolicy) -> Result<()> {
        let id = policy.id.clone();
        {
            let mut policies = self.policies.write();
            if policies.contains_key(&id) {
                return Err(Error::PolicyExists(id));
            }
            policies.insert(id.clone(), policy);
        }
        self.status.write().entry(id.clone()).or_default();
        if self.started.load(Ordering::SeqCst) {
            self.spawn_policy_loop(id);
        }
        Ok(())
    }

    fn remove_policy(&self, id: &str) -> Result<()> {
        if self.policies.write().remove(id).is_none() {
            return Err(Error::PolicyNotFound(id.to_string()));
        }
        self.status.write().remove(id);
        if let Some(task) = self.tasks.lock().remove(id) {
            task.abort();
        }
        Ok(())
    }

    fn policy(&self, id: &str) -> Result<ReplicationPolicy> {
        self.policies
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::PolicyNotFound(id.to_string()))
    }

    fn policies(&self) -> Vec<ReplicationPolicy> {
        let mut policies: Vec<ReplicationPolicy> =
            self.policies.read().values().cloned().collect();
        policies.sort_by(|a, b| a.id.cmp(&b.id));
        policies
    }

    async fn sync_all(&self) -> Result<Vec<SyncResult>> {
        let ids: Vec<String> = self
            .policies()
            .into_iter()
            .filter(|p| p.enabled)
            .map(|p| p.id)
            .collect();
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            results.push(self.run_sync(&id).await?);
        }
        Ok(results)
    }

    async fn sync_policy(&self, id: &str) -> Result<SyncResult> {
        self.run_sync(id).await
    }

    fn status_source(&self) -> Option<&dyn ReplicationStatusSource> {
        Some(self)
    }
}

impl ReplicationStatusSource for ReplicationManager {
    fn replication_status(&self, id: &str) -> Result<ReplicationStatus> {
        if !self.policies.read().contains_key(id) {
            return Err(Error::PolicyNotFound(id.to_string()));
        }
        Ok(self.status.read().get(id).cloned().unwrap_or_default())
    }
}
