//! Local filesystem backend
//!
//! The reference implementation of the storage contract. A key `a/b/c`
//! maps to `<root>/a/b/c`; its metadata lives in the sidecar
//! `<root>/a/b/c.metadata.json`. Parent directories are created 0750,
//! data and sidecar files 0600.

mod list;

#[cfg(test)]
mod tests;

use crate::changelog::ChangeLog;
use crate::encrypt::EncrypterFactory;
use crate::lifecycle::{
    LifecycleManager, LifecycleManagerKind, MemoryLifecycleManager, PersistentLifecycleManager,
    DEFAULT_SCAN_INTERVAL,
};
use crate::store::{ObjectStore, OpContext};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use objstore_common::{
    validate_key, Archiver, ChangeEvent, Error, LifecycleAction, LifecyclePolicy, ListOptions,
    ListResult, Metadata, ObjectReader, ReplicationDriver, Result, ENCRYPTION_ALGORITHM_KEY,
    ENCRYPTION_KEY_ID_KEY,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Suffix of per-object metadata sidecar files
pub const METADATA_SUFFIX: &str = ".metadata.json";

/// Default file name of the persistent lifecycle policy store
pub const DEFAULT_LIFECYCLE_POLICY_FILE: &str = ".lifecycle-policies.json";

const COPY_BUF_SIZE: usize = 64 * 1024;

/// The local-filesystem reference backend
#[derive(Clone, Default)]
pub struct LocalStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: RwLock<LocalState>,
}

#[derive(Default)]
struct LocalState {
    root: Option<PathBuf>,
    lifecycle: Option<Arc<dyn LifecycleManager>>,
    lifecycle_policy_file: Option<String>,
    lifecycle_running: bool,
    changelog: Option<Arc<dyn ChangeLog>>,
    encrypter_factory: Option<Arc<dyn EncrypterFactory>>,
    replication: Option<Arc<dyn ReplicationDriver>>,
}

/// Local ETag convention: `"<mtime-unix>-<size>"`
#[must_use]
pub fn local_etag(mtime_unix: i64, size: i64) -> String {
    format!("{mtime_unix}-{size}")
}

impl LocalStore {
    /// Create an unconfigured store; call `configure` before use
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or remove the changelog; `None` disables recording
    pub fn set_change_log(&self, changelog: Option<Arc<dyn ChangeLog>>) {
        self.inner.state.write().changelog = changelog;
    }

    /// Install or remove the at-rest encrypter factory
    pub fn set_encrypter_factory(&self, factory: Option<Arc<dyn EncrypterFactory>>) {
        self.inner.state.write().encrypter_factory = factory;
    }

    /// Attach a replication driver, making this backend replication-capable
    pub fn set_replication_manager(&self, driver: Option<Arc<dyn ReplicationDriver>>) {
        self.inner.state.write().replication = driver;
    }

    /// The configured storage root
    pub fn root(&self) -> Result<PathBuf> {
        self.inner.state.read().root.clone().ok_or(Error::PathNotSet)
    }

    pub(crate) fn lifecycle_policy_file(&self) -> String {
        self.inner
            .state
            .read()
            .lifecycle_policy_file
            .clone()
            .unwrap_or_else(|| DEFAULT_LIFECYCLE_POLICY_FILE.to_string())
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        Ok(self.root()?.join(key))
    }

    fn sidecar_path(&self, key: &str) -> Result<PathBuf> {
        Ok(self.root()?.join(format!("{key}{METADATA_SUFFIX}")))
    }

    fn changelog(&self) -> Option<Arc<dyn ChangeLog>> {
        self.inner.state.read().changelog.clone()
    }

    fn encrypter_factory(&self) -> Option<Arc<dyn EncrypterFactory>> {
        self.inner.state.read().encrypter_factory.clone()
    }

    fn lifecycle_manager(&self) -> Arc<dyn LifecycleManager> {
        let mut state = self.inner.state.write();
        state
            .lifecycle
            .get_or_insert_with(|| Arc::new(MemoryLifecycleManager::new()))
            .clone()
    }

    async fn read_sidecar(&self, key: &str) -> Option<Metadata> {
        let path = self.sidecar_path(key).ok()?;
        let bytes = tokio::fs::read(&path).await.ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(meta) => Some(meta),
            Err(err) => {
                tracing::warn!(key, error = %err, "ignoring corrupt metadata sidecar");
                None
            }
        }
    }

    async fn write_sidecar(&self, key: &str, metadata: &Metadata) -> Result<()> {
        let path = self.sidecar_path(key)?;
        let bytes = serde_json::to_vec_pretty(metadata)
            .map_err(|e| Error::serialization(e.to_string()))?;

        // Write-then-rename so readers never observe a half-written sidecar
        let tmp = sidecar_tmp_path(&path);
        tokio::fs::write(&tmp, &bytes).await?;
        set_mode(&tmp, 0o600).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Synthesize metadata from filesystem attributes (I1: sidecar-less
    /// objects are still readable)
    fn synthesize_metadata(size: i64, modified: DateTime<Utc>) -> Metadata {
        Metadata {
            size,
            last_modified: modified,
            etag: local_etag(modified.timestamp(), size),
            ..Metadata::default()
        }
    }

    fn start_lifecycle_loop(&self) {
        {
            let mut state = self.inner.state.write();
            if state.lifecycle_running {
                return;
            }
            state.lifecycle_running = true;
        }
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(DEFAULT_SCAN_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match store.apply_lifecycle_policies().await {
                    Ok(actions) if actions > 0 => {
                        tracing::info!(actions, "lifecycle scan pass complete");
                    }
                    Ok(_) => {}
                    Err(err) => tracing::warn!(error = %err, "lifecycle scan pass failed"),
                }
            }
        });
    }

    /// One lifecycle scan pass over every registered policy.
    ///
    /// Per-object action errors are logged and skipped; the pass
    /// continues. Returns the number of actions performed.
    async fn lifecycle_scan_pass(&self) -> Result<u64> {
        let Some(manager) = self.inner.state.read().lifecycle.clone() else {
            return Ok(0);
        };
        let ctx = OpContext::background();
        let mut actions = 0u64;
        for policy in manager.policies() {
            let entries = self.walk(&ctx).await?;
            let now = Utc::now();
            for entry in entries {
                if !entry.key.starts_with(&policy.prefix) {
                    continue;
                }
                let age = (now - entry.modified).to_std().unwrap_or_default();
                if age <= policy.retention {
                    continue;
                }
                match policy.action {
                    LifecycleAction::Delete => match self.delete(&entry.key).await {
                        Ok(()) => actions += 1,
                        Err(err) => {
                            tracing::warn!(policy = %policy.id, key = %entry.key, error = %err,
                                "lifecycle delete failed");
                        }
                    },
                    LifecycleAction::Archive => {
                        let Some(destination) = policy.destination.clone() else {
                            tracing::warn!(policy = %policy.id,
                                "archive policy has no destination, skipping");
                            continue;
                        };
                        let result = async {
                            let reader = self.get(&entry.key).await?;
                            destination.archive(&entry.key, reader).await
                        }
                        .await;
                        match result {
                            Ok(()) => actions += 1,
                            Err(err) => {
                                tracing::warn!(policy = %policy.id, key = %entry.key, error = %err,
                                    "lifecycle archive failed");
                            }
                        }
                    }
                }
            }
        }
        Ok(actions)
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn configure(&self, settings: &HashMap<String, String>) -> Result<()> {
        let root = PathBuf::from(settings.get("path").ok_or(Error::PathNotSet)?);
        tokio::fs::create_dir_all(&root).await?;
        set_mode(&root, 0o750).await?;

        let kind: LifecycleManagerKind = settings
            .get("lifecycleManagerType")
            .map(|s| s.parse())
            .transpose()?
            .unwrap_or_default();
        let policy_file = settings
            .get("lifecyclePolicyFile")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LIFECYCLE_POLICY_FILE.to_string());
        let manager: Arc<dyn LifecycleManager> = match kind {
            LifecycleManagerKind::Memory => Arc::new(MemoryLifecycleManager::new()),
            LifecycleManagerKind::Persistent => {
                Arc::new(PersistentLifecycleManager::open(root.join(&policy_file))?)
            }
        };

        {
            let mut state = self.inner.state.write();
            state.root = Some(root);
            state.lifecycle = Some(manager);
            state.lifecycle_policy_file = Some(policy_file);
        }

        if settings.get("runLifecycle").map(String::as_str) == Some("true") {
            self.start_lifecycle_loop();
        }
        Ok(())
    }

    async fn put_with_metadata(
        &self,
        ctx: &OpContext,
        key: &str,
        data: ObjectReader,
        metadata: Option<Metadata>,
    ) -> Result<()> {
        validate_key(key)?;
        if let Some(meta) = &metadata {
            meta.validate_custom()?;
        }
        ctx.check()?;

        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
            set_mode(parent, 0o750).await?;
        }

        let encrypter = match self.encrypter_factory() {
            Some(factory) => Some(factory.encrypter()?),
            None => None,
        };
        let mut reader = match &encrypter {
            Some(enc) => enc.encrypt(data).await?,
            None => data,
        };

        ctx.check()?;
        let mut file = tokio::fs::File::create(&path).await?;
        set_mode(&path, 0o600).await?;

        let mut size: i64 = 0;
        let mut buf = vec![0u8; COPY_BUF_SIZE];
        loop {
            ctx.check()?;
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n]).await?;
            size += n as i64;
        }
        file.flush().await?;
        drop(file);

        let stat = tokio::fs::metadata(&path).await?;
        let modified: DateTime<Utc> = stat.modified()?.into();
        let etag = local_etag(modified.timestamp(), size);

        let mut meta = metadata.unwrap_or_default();
        meta.size = size;
        meta.last_modified = modified;
        meta.etag = etag.clone();
        if let Some(enc) = &encrypter {
            meta.set_encryption(enc.algorithm(), enc.key_id());
        }
        meta.validate_custom()?;
        self.write_sidecar(key, &meta).await?;

        if let Some(changelog) = self.changelog() {
            changelog.record_change(ChangeEvent::put(key, etag, size))?;
        }
        Ok(())
    }

    async fn get_with_context(&self, ctx: &OpContext, key: &str) -> Result<ObjectReader> {
        validate_key(key)?;
        ctx.check()?;

        let path = self.object_path(key)?;
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::KeyNotFound(key.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        if file.metadata().await?.is_dir() {
            return Err(Error::KeyNotFound(key.to_string()));
        }

        // Stored bytes are the truth: when no factory is installed the
        // reader yields them as-is, so opaque replication can copy
        // ciphertext verbatim.
        let reader: ObjectReader = Box::new(file);
        if let Some(meta) = self.read_sidecar(key).await {
            if meta.is_encrypted() {
                if let Some(factory) = self.encrypter_factory() {
                    return factory.encrypter()?.decrypt(reader).await;
                }
            }
        }
        Ok(reader)
    }

    async fn delete_with_context(&self, ctx: &OpContext, key: &str) -> Result<()> {
        validate_key(key)?;
        ctx.check()?;

        // Best-effort sidecar removal; the object file is the truth (I2)
        if let Ok(sidecar) = self.sidecar_path(key) {
            let _ = tokio::fs::remove_file(&sidecar).await;
        }

        let path = self.object_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::KeyNotFound(key.to_string()));
            }
            Err(err) => return Err(err.into()),
        }

        if let Some(changelog) = self.changelog() {
            changelog.record_change(ChangeEvent::delete(key))?;
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let path = self.object_path(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(stat) => Ok(stat.is_file()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn list_with_context(&self, ctx: &OpContext, prefix: &str) -> Result<Vec<String>> {
        if !prefix.is_empty() {
            validate_key(prefix)?;
        }
        let entries = self.walk(ctx).await?;
        Ok(entries
            .into_iter()
            .filter(|e| e.key.starts_with(prefix))
            .map(|e| e.key)
            .collect())
    }

    async fn list_with_options(
        &self,
        ctx: &OpContext,
        options: Option<ListOptions>,
    ) -> Result<ListResult> {
        self.list_paginated(ctx, options.unwrap_or_default()).await
    }

    async fn get_metadata(&self, key: &str) -> Result<Metadata> {
        validate_key(key)?;
        if let Some(meta) = self.read_sidecar(key).await {
            return Ok(meta);
        }
        let path = self.object_path(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(stat) if stat.is_file() => {
                let modified: DateTime<Utc> = stat.modified()?.into();
                Ok(Self::synthesize_metadata(stat.len() as i64, modified))
            }
            Ok(_) => Err(Error::KeyNotFound(key.to_string())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::KeyNotFound(key.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn update_metadata(&self, key: &str, metadata: Metadata) -> Result<Metadata> {
        validate_key(key)?;
        metadata.validate_custom()?;

        let path = self.object_path(key)?;
        let stat = match tokio::fs::metadata(&path).await {
            Ok(stat) if stat.is_file() => stat,
            Ok(_) => return Err(Error::KeyNotFound(key.to_string())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::KeyNotFound(key.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        let modified: DateTime<Utc> = stat.modified()?.into();
        let size = stat.len() as i64;

        let mut meta = metadata;
        meta.size = size;
        meta.last_modified = modified;
        meta.etag = local_etag(modified.timestamp(), size);

        // Encryption bookkeeping survives metadata updates; losing it
        // would make the object undecryptable.
        if let Some(existing) = self.read_sidecar(key).await {
            for reserved in [ENCRYPTION_ALGORITHM_KEY, ENCRYPTION_KEY_ID_KEY] {
                if let Some(value) = existing.custom.get(reserved) {
                    meta.custom
                        .entry(reserved.to_string())
                        .or_insert_with(|| value.clone());
                }
            }
        }

        self.write_sidecar(key, &meta).await?;
        Ok(meta)
    }

    async fn archive(&self, key: &str, destination: Option<Arc<dyn Archiver>>) -> Result<()> {
        validate_key(key)?;
        let destination = destination.ok_or(Error::ArchiveDestinationNil)?;
        let reader = self.get(key).await?;
        destination.archive(key, reader).await
    }

    fn add_policy(&self, policy: LifecyclePolicy) -> Result<()> {
        self.lifecycle_manager().add_policy(policy)
    }

    fn remove_policy(&self, id: &str) -> Result<()> {
        self.lifecycle_manager().remove_policy(id)
    }

    fn policies(&self) -> Result<Vec<LifecyclePolicy>> {
        Ok(self.lifecycle_manager().policies())
    }

    async fn apply_lifecycle_policies(&self) -> Result<u64> {
        self.lifecycle_scan_pass().await
    }

    fn replication_manager(&self) -> Option<Arc<dyn ReplicationDriver>> {
        self.inner.state.read().replication.clone()
    }
}

#[async_trait]
impl Archiver for LocalStore {
    async fn archive(&self, key: &str, data: ObjectReader) -> Result<()> {
        self.put(key, data).await
    }
}

fn sidecar_tmp_path(sidecar: &Path) -> PathBuf {
    let mut os = sidecar.as_os_str().to_owned();
    os.push(".tmp");
    PathBuf::from(os)
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
