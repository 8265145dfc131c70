//! ObjStore RPC - Streaming RPC server
//!
//! The typed, framed, interceptor-chained server for general clients.
//! Every call runs through the chain in strict outer-to-inner order:
//! recovery → request-id → rate-limit → audit → authentication →
//! logging → metrics → custom → handler.

pub mod audit;
pub mod auth;
pub mod context;
pub mod convert;
pub mod interceptor;
pub mod interceptors;
pub mod metrics;
pub mod service;

pub use audit::{AuditEvent, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use auth::{Authenticator, NoopAuthenticator, TokenAuthenticator};
pub use context::{CallContext, SharedContext};
pub use interceptor::{Interceptor, InterceptorChain, Next, RpcReply};
pub use interceptors::RateLimitConfig;
pub use metrics::{rpc_metrics, RpcMetrics};
pub use service::{ObjectStoreService, RpcConfig};
