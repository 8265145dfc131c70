//! The streaming RPC service
//!
//! Every method builds a call context, runs the interceptor chain, and
//! maps domain errors to wire status codes. Get is the only streaming
//! operation: metadata rides the first frame, data fills the middle
//! frames, and an empty `is_last` frame terminates the stream.

use crate::audit::{AuditSink, TracingAuditSink};
use crate::auth::{Authenticator, NoopAuthenticator};
use crate::context::{CallContext, SharedContext};
use crate::convert;
use crate::interceptor::{Interceptor, InterceptorChain, RpcReply};
use crate::interceptors::{
    AuditInterceptor, AuthInterceptor, LoggingInterceptor, MetricsInterceptor, RateLimitConfig,
    RateLimitInterceptor, RecoveryInterceptor, RequestIdInterceptor,
};
use crate::metrics::{rpc_metrics, RpcMetrics};
use objstore_common::{Archiver, Error, ListOptions, Result};
use objstore_proto::v1 as pb;
use objstore_store::{Facade, LocalStore, ObjectStore, OpContext, StoreArchiver};
use std::io::Cursor;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};

/// Default Get frame payload size (64 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Server configuration
pub struct RpcConfig {
    /// Get frame payload size
    pub chunk_size: usize,
    /// Token-bucket rate limiting; `None` disables the interceptor
    pub rate_limit: Option<RateLimitConfig>,
    /// Call authenticator
    pub authenticator: Arc<dyn Authenticator>,
    /// Destination for audit events
    pub audit_sink: Arc<dyn AuditSink>,
    /// Metrics collector
    pub metrics: Arc<RpcMetrics>,
    /// Custom interceptors appended after the built-in chain
    pub extra_interceptors: Vec<Arc<dyn Interceptor>>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            rate_limit: None,
            authenticator: Arc::new(NoopAuthenticator),
            audit_sink: Arc::new(TracingAuditSink),
            metrics: rpc_metrics(),
            extra_interceptors: Vec::new(),
        }
    }
}

/// The streaming RPC service implementation
pub struct ObjectStoreService {
    facade: Arc<Facade>,
    chain: InterceptorChain,
    chunk_size: usize,
    metrics: Arc<RpcMetrics>,
}

impl ObjectStoreService {
    /// Build the service with the standard interceptor chain:
    /// recovery → request-id → rate-limit → audit → authentication →
    /// logging → metrics → custom.
    #[must_use]
    pub fn new(facade: Arc<Facade>, config: RpcConfig) -> Self {
        let mut interceptors: Vec<Arc<dyn Interceptor>> = vec![
            Arc::new(RecoveryInterceptor),
            Arc::new(RequestIdInterceptor),
        ];
        if let Some(rate) = config.rate_limit {
            interceptors.push(Arc::new(RateLimitInterceptor::new(rate)));
        }
        interceptors.push(Arc::new(AuditInterceptor::new(config.audit_sink)));
        interceptors.push(Arc::new(AuthInterceptor::new(config.authenticator)));
        interceptors.push(Arc::new(LoggingInterceptor));
        interceptors.push(Arc::new(MetricsInterceptor::new(config.metrics.clone())));
        interceptors.extend(config.extra_interceptors);

        Self {
            facade,
            chain: InterceptorChain::new(interceptors),
            chunk_size: config.chunk_size,
            metrics: config.metrics,
        }
    }

    /// Wrap into the tonic server type
    pub fn into_server(self) -> pb::object_store_server::ObjectStoreServer<Self> {
        pb::object_store_server::ObjectStoreServer::new(self)
    }

    fn context<T>(&self, method: &'static str, request: &Request<T>, mutation: bool) -> SharedContext {
        let mut ctx = CallContext::new(method);
        ctx.mutation = mutation;
        ctx.client_ip = request.remote_addr().map(|a| a.to_string());

        let meta = request.metadata();
        if let Some(id) = meta.get("x-request-id").and_then(|v| v.to_str().ok()) {
            ctx.request_id = Some(id.to_string());
        }
        if let Some(auth) = meta.get("authorization").and_then(|v| v.to_str().ok()) {
            ctx.bearer_token = Some(auth.strip_prefix("Bearer ").unwrap_or(auth).to_string());
        }
        ctx.client_id = meta
            .get("x-client-id")
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
            .or_else(|| ctx.client_ip.clone())
            .unwrap_or_else(|| "unknown".to_string());

        ctx.shared()
    }
}

fn resolve(facade: &Facade, name: &str) -> Result<Arc<dyn ObjectStore>> {
    if name.is_empty() {
        facade.default_backend()
    } else {
        facade.backend(name)
    }
}

#[tonic::async_trait]
impl pb::object_store_server::ObjectStore for ObjectStoreService {
    async fn put(
        &self,
        request: Request<pb::PutRequest>,
    ) -> std::result::Result<Response<pb::PutResponse>, Status> {
        let ctx = self.context("Put", &request, true);
        let req = request.into_inner();
        {
            let mut guard = ctx.lock();
            guard.backend = req.backend.clone();
            guard.key = req.key.clone();
            guard.bytes_transferred = req.data.len() as u64;
        }
        let facade = self.facade.clone();
        let reply = self
            .chain
            .execute(
                ctx,
                Box::new(move |_ctx| {
                    Box::pin(async move {
                        let backend = resolve(&facade, &req.backend)?;
                        let metadata = req.metadata.map(convert::metadata_from_proto).transpose()?;
                        backend
                            .put_with_metadata(
                                &OpContext::background(),
                                &req.key,
                                Box::new(Cursor::new(req.data)),
                                metadata,
                            )
                            .await?;
                        Ok(RpcReply::Put(pb::PutResponse {}))
                    })
                }),
            )
            .await;
        match reply {
            Ok(RpcReply::Put(resp)) => Ok(Response::new(resp)),
            Ok(_) => Err(Status::internal("unexpected reply type")),
            Err(err) => Err(convert::status_from_error(&err)),
        }
    }

    type GetStream = ReceiverStream<std::result::Result<pb::GetResponse, Status>>;

    async fn get(
        &self,
        request: Request<pb::GetRequest>,
    ) -> std::result::Result<Response<Self::GetStream>, Status> {
        let ctx = self.context("Get", &request, false);
        let req = request.into_inner();
        {
            let mut guard = ctx.lock();
            guard.backend = req.backend.clone();
            guard.key = req.key.clone();
        }
        let facade = self.facade.clone();
        let metrics = self.metrics.clone();
        let chunk_size = self.chunk_size;
        let reply = self
            .chain
            .execute(
                ctx,
                Box::new(move |_ctx| {
                    Box::pin(async move {
                        let backend = resolve(&facade, &req.backend)?;
                        let metadata = backend.get_metadata(&req.key).await?;
                        let mut reader = backend
                            .get_with_context(&OpContext::background(), &req.key)
                            .await?;

                        let (tx, rx) = mpsc::channel(8);
                        metrics.stream_opened();
                        tokio::spawn(async move {
                            let mut first_metadata = Some(convert::metadata_to_proto(&metadata));
                            let mut buf = vec![0u8; chunk_size.max(1)];
                            loop {
                                match reader.read(&mut buf).await {
                                    Ok(0) => {
                                        if let Some(meta) = first_metadata.take() {
                                            // Empty object: the first frame
                                            // still carries the metadata
                                            let frame = pb::GetResponse {
                                                data: Vec::new(),
                                                metadata: Some(meta),
                                                is_last: false,
                                            };
                                            if tx.send(Ok(frame)).await.is_err() {
                                                break;
                                            }
                                        }
                                        let _ = tx
                                            .send(Ok(pb::GetResponse {
                                                data: Vec::new(),
                                                metadata: None,
                                                is_last: true,
                                            }))
                                            .await;
                                        break;
                                    }
                                    Ok(n) => {
                                        let frame = pb::GetResponse {
                                            data: buf[..n].to_vec(),
                                            metadata: first_metadata.take(),
                                            is_last: false,
                                        };
                                        // A failed send means the client went
                                        // away; drop the reader and stop
                                        if tx.send(Ok(frame)).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(err) => {
                                        let _ = tx
                                            .send(Err(convert::status_from_error(&err.into())))
                                            .await;
                                        break;
                                    }
                                }
                            }
                            metrics.stream_closed();
                        });
                        Ok(RpcReply::Get(rx))
                    })
                }),
            )
            .await;
        match reply {
            Ok(RpcReply::Get(rx)) => Ok(Response::new(ReceiverStream::new(rx))),
            Ok(_) => Err(Status::internal("unexpected reply type")),
            Err(err) => Err(convert::status_from_error(&err)),
        }
    }

    async fn delete(
        &self,
        request: Request<pb::DeleteRequest>,
    ) -> std::result::Result<Response<pb::DeleteResponse>, Status> {
        let ctx = self.context("Delete", &request, true);
        let req = request.into_inner();
        {
            let mut guard = ctx.lock();
            guard.backend = req.backend.clone();
            guard.key = req.key.clone();
        }
        let facade = self.facade.clone();
        let reply = self
            .chain
            .execute(
                ctx,
                Box::new(move |_ctx| {
                    Box::pin(async move {
                        let backend = resolve(&facade, &req.backend)?;
                        backend
                            .delete_with_context(&OpContext::background(), &req.key)
                            .await?;
                        Ok(RpcReply::Delete(pb::DeleteResponse {}))
                    })
                }),
            )
            .await;
        match reply {
            Ok(RpcReply::Delete(resp)) => Ok(Response::new(resp)),
            Ok(_) => Err(Status::internal("unexpected reply type")),
            Err(err) => Err(convert::status_from_error(&err)),
        }
    }

    async fn exists(
        &self,
        request: Request<pb::ExistsRequest>,
    ) -> std::result::Result<Response<pb::ExistsResponse>, Status> {
        let ctx = self.context("Exists", &request, false);
        let req = request.into_inner();
        {
            let mut guard = ctx.lock();
            guard.backend = req.backend.clone();
            guard.key = req.key.clone();
        }
        let facade = self.facade.clone();
        let reply = self
            .chain
            .execute(
                ctx,
                Box::new(move |_ctx| {
                    Box::pin(async move {
                        let backend = resolve(&facade, &req.backend)?;
                        let exists = backend.exists(&req.key).await?;
                        Ok(RpcReply::Exists(pb::ExistsResponse { exists }))
                    })
                }),
            )
            .await;
        match reply {
            Ok(RpcReply::Exists(resp)) => Ok(Response::new(resp)),
            Ok(_) => Err(Status::internal("unexpected reply type")),
            Err(err) => Err(convert::status_from_error(&err)),
        }
    }

    async fn list(
        &self,
        request: Request<pb::ListRequest>,
    ) -> std::result::Result<Response<pb::ListResponse>, Status> {
        let ctx = self.context("List", &request, false);
        let req = request.into_inner();
        ctx.lock().backend = req.backend.clone();
        let facade = self.facade.clone();
        let reply = self
            .chain
            .execute(
                ctx,
                Box::new(move |_ctx| {
                    Box::pin(async move {
                        let backend = resolve(&facade, &req.backend)?;
                        let options = ListOptions {
                            prefix: req.prefix,
                            delimiter: req.delimiter,
                            max_results: usize::try_from(req.max_results.max(0))
                                .unwrap_or_default(),
                            continue_from: if req.continue_from.is_empty() {
                                None
                            } else {
                                Some(req.continue_from)
                            },
                        };
                        let result = backend
                            .list_with_options(&OpContext::background(), Some(options))
                            .await?;
                        Ok(RpcReply::List(convert::list_result_to_proto(&result)))
                    })
                }),
            )
            .await;
        match reply {
            Ok(RpcReply::List(resp)) => Ok(Response::new(resp)),
            Ok(_) => Err(Status::internal("unexpected reply type")),
            Err(err) => Err(convert::status_from_error(&err)),
        }
    }

    async fn get_metadata(
        &self,
        request: Request<pb::GetMetadataRequest>,
    ) -> std::result::Result<Response<pb::GetMetadataResponse>, Status> {
        let ctx = self.context("GetMetadata", &request, false);
        let req = request.into_inner();
        {
            let mut guard = ctx.lock();
            guard.backend = req.backend.clone();
            guard.key = req.key.clone();
        }
        let facade = self.facade.clone();
        let reply = self
            .chain
            .execute(
                ctx,
                Box::new(move |_ctx| {
                    Box::pin(async move {
                        let backend = resolve(&facade, &req.backend)?;
                        let metadata = backend.get_metadata(&req.key).await?;
                        Ok(RpcReply::GetMetadata(pb::GetMetadataResponse {
                            metadata: Some(convert::metadata_to_proto(&metadata)),
                        }))
                    })
                }),
            )
            .await;
        match reply {
            Ok(RpcReply::GetMetadata(resp)) => Ok(Response::new(resp)),
            Ok(_) => Err(Status::internal("unexpected reply type")),
            Err(err) => Err(convert::status_from_error(&err)),
        }
    }

    async fn update_metadata(
        &self,
        request: Request<pb::UpdateMetadataRequest>,
    ) -> std::result::Result<Response<pb::UpdateMetadataResponse>, Status> {
        let ctx = self.context("UpdateMetadata", &request, true);
        let req = request.into_inner();
        {
            let mut guard = ctx.lock();
            guard.backend = req.backend.clone();
            guard.key = req.key.clone();
        }
        let facade = self.facade.clone();
        let reply = self
            .chain
            .execute(
                ctx,
                Box::new(move |_ctx| {
                    Box::pin(async move {
                        let backend = resolve(&facade, &req.backend)?;
                        let metadata = req
                            .metadata
                            .map(convert::metadata_from_proto)
                            .transpose()?
                            .ok_or_else(|| Error::invalid_metadata("metadata is required"))?;
                        let updated = backend.update_metadata(&req.key, metadata).await?;
                        Ok(RpcReply::UpdateMetadata(pb::UpdateMetadataResponse {
                            metadata: Some(convert::metadata_to_proto(&updated)),
                        }))
                    })
                }),
            )
            .await;
        match reply {
            Ok(RpcReply::UpdateMetadata(resp)) => Ok(Response::new(resp)),
            Ok(_) => Err(Status::internal("unexpected reply type")),
            Err(err) => Err(convert::status_from_error(&err)),
        }
    }

    async fn archive(
        &self,
        request: Request<pb::ArchiveRequest>,
    ) -> std::result::Result<Response<pb::ArchiveResponse>, Status> {
        let ctx = self.context("Archive", &request, true);
        let req = request.into_inner();
        {
            let mut guard = ctx.lock();
            guard.backend = req.backend.clone();
            guard.key = req.key.clone();
        }
        let facade = self.facade.clone();
        let reply = self
            .chain
            .execute(
                ctx,
                Box::new(move |_ctx| {
                    Box::pin(async move {
                        let backend = resolve(&facade, &req.backend)?;
                        let destination: Arc<dyn Archiver> = if req.destination_type.is_empty() {
                            return Err(Error::DestinationTypeRequired);
                        } else if facade.is_registered(&req.destination_type) {
                            Arc::new(StoreArchiver(facade.backend(&req.destination_type)?))
                        } else if req.destination_type == "local" {
                            let store = LocalStore::new();
                            store.configure(&req.destination_settings).await?;
                            Arc::new(store)
                        } else {
                            return Err(Error::BackendNotFound(req.destination_type));
                        };
                        backend.archive(&req.key, Some(destination)).await?;
                        Ok(RpcReply::Archive(pb::ArchiveResponse {}))
                    })
                }),
            )
            .await;
        match reply {
            Ok(RpcReply::Archive(resp)) => Ok(Response::new(resp)),
            Ok(_) => Err(Status::internal("unexpected reply type")),
            Err(err) => Err(convert::status_from_error(&err)),
        }
    }

    async fn health(
        &self,
        request: Request<pb::HealthRequest>,
    ) -> std::result::Result<Response<pb::HealthResponse>, Status> {
        let ctx = self.context("Health", &request, false);
        let reply = self
            .chain
            .execute(
                ctx,
                Box::new(move |_ctx| {
                    Box::pin(async move {
                        Ok(RpcReply::Health(pb::HealthResponse {
                            status: "ok".to_string(),
                            version: env!("CARGO_PKG_VERSION").to_string(),
                        }))
                    })
                }),
            )
            .await;
        match reply {
            Ok(RpcReply::Health(resp)) => Ok(Response::new(resp)),
            Ok(_) => Err(Status::internal("unexpected reply type")),
            Err(err) => Err(convert::status_from_error(&err)),
        }
    }
}
