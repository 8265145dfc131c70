//! Interceptor chain
//!
//! An onion of interceptors executed in registration order around every
//! handler. Each interceptor decides whether to call `next` (continuing
//! inward) or short-circuit with an error.

use crate::context::SharedContext;
use async_trait::async_trait;
use futures::future::BoxFuture;
use objstore_common::Result;
use objstore_proto::v1 as pb;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Type-erased handler reply; one variant per RPC method
pub enum RpcReply {
    Put(pb::PutResponse),
    /// Frames for the streaming Get response
    Get(mpsc::Receiver<std::result::Result<pb::GetResponse, tonic::Status>>),
    Delete(pb::DeleteResponse),
    Exists(pb::ExistsResponse),
    List(pb::ListResponse),
    GetMetadata(pb::GetMetadataResponse),
    UpdateMetadata(pb::UpdateMetadataResponse),
    Archive(pb::ArchiveResponse),
    Health(pb::HealthResponse),
}

/// The innermost piece of the onion: the actual RPC handler
pub type Handler = Box<dyn FnOnce(SharedContext) -> BoxFuture<'static, Result<RpcReply>> + Send>;

/// One layer of the chain
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Name used in logs and ordering diagnostics
    fn name(&self) -> &'static str;

    /// Handle the call; call `next.run(ctx)` to continue inward
    async fn handle(&self, ctx: SharedContext, next: Next) -> Result<RpcReply>;
}

/// The remainder of the chain from an interceptor's point of view
pub struct Next {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    index: usize,
    handler: Handler,
}

impl Next {
    /// Run the rest of the chain and the handler
    pub async fn run(mut self, ctx: SharedContext) -> Result<RpcReply> {
        if self.index < self.interceptors.len() {
            let interceptor = Arc::clone(&self.interceptors[self.index]);
            self.index += 1;
            interceptor.handle(ctx, self).await
        } else {
            (self.handler)(ctx).await
        }
    }
}

/// An ordered, immutable chain of interceptors
#[derive(Clone)]
pub struct InterceptorChain {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
}

impl InterceptorChain {
    /// Build a chain; interceptors run outer-to-inner in the given order
    #[must_use]
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        Self {
            interceptors: interceptors.into(),
        }
    }

    /// Execute the chain around a handler
    pub async fn execute(&self, ctx: SharedContext, handler: Handler) -> Result<RpcReply> {
        Next {
            interceptors: Arc::clone(&self.interceptors),
            index: 0,
            handler,
        }
        .run(ctx)
        .await
    }
}
