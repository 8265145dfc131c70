//! Call metrics

use crate::context::SharedContext;
use crate::interceptor::{Interceptor, Next, RpcReply};
use crate::metrics::RpcMetrics;
use async_trait::async_trait;
use objstore_common::Result;
use std::sync::Arc;
use std::time::Instant;

pub struct MetricsInterceptor {
    metrics: Arc<RpcMetrics>,
}

impl MetricsInterceptor {
    #[must_use]
    pub fn new(metrics: Arc<RpcMetrics>) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl Interceptor for MetricsInterceptor {
    fn name(&self) -> &'static str {
        "metrics"
    }

    async fn handle(&self, ctx: SharedContext, next: Next) -> Result<RpcReply> {
        let method = ctx.lock().method;
        let started = Instant::now();
        let result = next.run(ctx).await;
        let latency_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.metrics.record(method, result.is_ok(), latency_us);
        result
    }
}
