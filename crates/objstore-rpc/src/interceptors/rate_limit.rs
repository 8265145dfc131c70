//! Token-bucket rate limiting
//!
//! One bucket per {method, client-id}; exceeding the limit fails the call
//! with `resource-exhausted` before any work happens.

use crate::context::SharedContext;
use crate::interceptor::{Interceptor, Next, RpcReply};
use async_trait::async_trait;
use objstore_common::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Instant;

/// Rate limiter settings
#[derive(Clone, Copy, Debug)]
pub struct RateLimitConfig {
    /// Sustained requests per second per {method, client}
    pub requests_per_second: f64,
    /// Burst capacity per {method, client}
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 100.0,
            burst: 200,
        }
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimitInterceptor {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<(String, String), Bucket>>,
}

impl RateLimitInterceptor {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    fn allow(&self, method: &str, client_id: &str) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        let bucket = buckets
            .entry((method.to_string(), client_id.to_string()))
            .or_insert_with(|| Bucket {
                tokens: f64::from(self.config.burst),
                last_refill: now,
            });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.config.requests_per_second)
            .min(f64::from(self.config.burst));
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl Interceptor for RateLimitInterceptor {
    fn name(&self) -> &'static str {
        "rate-limit"
    }

    async fn handle(&self, ctx: SharedContext, next: Next) -> Result<RpcReply> {
        let (method, client_id) = {
            let guard = ctx.lock();
            (guard.method, guard.client_id.clone())
        };
        if !self.allow(method, &client_id) {
            return Err(Error::ResourceExhausted(format!(
                "rate limit exceeded for {method}"
            )));
        }
        next.run(ctx).await
    }
}
