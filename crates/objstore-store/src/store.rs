//! The uniform blob-storage contract
//!
//! Every backend implements [`ObjectStore`]. Context-aware variants honour
//! cancellation at defined suspension points; the plain variants delegate
//! with a background context.

use async_trait::async_trait;
use objstore_common::{
    Archiver, Error, LifecyclePolicy, ListOptions, ListResult, Metadata, ObjectReader,
    ReplicationDriver, Result,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation and deadline carrier for storage operations.
///
/// Checked after validation and at every file-open/read/write boundary;
/// directory walks check it once per entry.
#[derive(Clone, Debug, Default)]
pub struct OpContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl OpContext {
    /// A context that is never cancelled
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// A context driven by an external cancellation token
    #[must_use]
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Attach an absolute deadline
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The underlying cancellation token
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Fail fast when the operation is cancelled or past its deadline
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Error::DeadlineExceeded);
            }
        }
        Ok(())
    }
}

/// The uniform blob interface every backend implements
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Apply a string→string settings map. Unknown keys are ignored;
    /// calling again with identical settings is a no-op.
    async fn configure(&self, settings: &HashMap<String, String>) -> Result<()>;

    /// Store an object
    async fn put(&self, key: &str, data: ObjectReader) -> Result<()> {
        self.put_with_context(&OpContext::background(), key, data)
            .await
    }

    /// Store an object, honouring cancellation
    async fn put_with_context(&self, ctx: &OpContext, key: &str, data: ObjectReader) -> Result<()> {
        self.put_with_metadata(ctx, key, data, None).await
    }

    /// Store an object with caller-supplied metadata
    async fn put_with_metadata(
        &self,
        ctx: &OpContext,
        key: &str,
        data: ObjectReader,
        metadata: Option<Metadata>,
    ) -> Result<()>;

    /// Open an object for reading
    async fn get(&self, key: &str) -> Result<ObjectReader> {
        self.get_with_context(&OpContext::background(), key).await
    }

    /// Open an object for reading, honouring cancellation
    async fn get_with_context(&self, ctx: &OpContext, key: &str) -> Result<ObjectReader>;

    /// Remove an object and its metadata
    async fn delete(&self, key: &str) -> Result<()> {
        self.delete_with_context(&OpContext::background(), key)
            .await
    }

    /// Remove an object, honouring cancellation
    async fn delete_with_context(&self, ctx: &OpContext, key: &str) -> Result<()>;

    /// Check whether an object exists
    async fn exists(&self, key: &str) -> Result<bool>;

    /// List all keys under a prefix (empty prefix lists everything)
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.list_with_context(&OpContext::background(), prefix)
            .await
    }

    /// List all keys under a prefix, honouring cancellation
    async fn list_with_context(&self, ctx: &OpContext, prefix: &str) -> Result<Vec<String>>;

    /// Paginated / delimited listing. `None` uses default options.
    async fn list_with_options(
        &self,
        ctx: &OpContext,
        options: Option<ListOptions>,
    ) -> Result<ListResult>;

    /// Fetch an object's metadata
    async fn get_metadata(&self, key: &str) -> Result<Metadata>;

    /// Persist caller-supplied content-type, content-encoding, and custom
    /// map; size, last-modified, and ETag are re-derived from the object.
    async fn update_metadata(&self, key: &str, metadata: Metadata) -> Result<Metadata>;

    /// Copy an object to an archive destination
    async fn archive(&self, key: &str, destination: Option<Arc<dyn Archiver>>) -> Result<()>;

    /// Register a lifecycle policy; duplicate ids are rejected
    fn add_policy(&self, policy: LifecyclePolicy) -> Result<()>;

    /// Remove a lifecycle policy by id
    fn remove_policy(&self, id: &str) -> Result<()>;

    /// All registered lifecycle policies
    fn policies(&self) -> Result<Vec<LifecyclePolicy>>;

    /// Run one lifecycle scan pass now, returning the number of actions
    /// performed. Backends without a lifecycle engine do nothing.
    async fn apply_lifecycle_policies(&self) -> Result<u64> {
        Ok(0)
    }

    /// Capability probe: a backend is replication-capable iff this
    /// returns a driver.
    fn replication_manager(&self) -> Option<Arc<dyn ReplicationDriver>> {
        None
    }
}

/// Adapter letting any registered backend serve as an archive destination
pub struct StoreArchiver(pub Arc<dyn ObjectStore>);

#[async_trait]
impl Archiver for StoreArchiver {
    async fn archive(&self, key: &str, data: ObjectReader) -> Result<()> {
        self.0.put(key, data).await
    }
}
