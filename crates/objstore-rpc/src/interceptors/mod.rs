//! The built-in interceptors, in their chain order

mod audit;
mod auth;
mod logging;
mod metrics;
mod rate_limit;
mod recovery;
mod request_id;

pub use audit::AuditInterceptor;
pub use auth::AuthInterceptor;
pub use logging::LoggingInterceptor;
pub use metrics::MetricsInterceptor;
pub use rate_limit::{RateLimitConfig, RateLimitInterceptor};
pub use recovery::RecoveryInterceptor;
pub use request_id::RequestIdInterceptor;
