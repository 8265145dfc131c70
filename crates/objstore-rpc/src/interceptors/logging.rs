//! Structured call logging

use crate::context::SharedContext;
use crate::interceptor::{Interceptor, Next, RpcReply};
use async_trait::async_trait;
use objstore_common::Result;
use std::time::Instant;

#[derive(Default)]
pub struct LoggingInterceptor;

#[async_trait]
impl Interceptor for LoggingInterceptor {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn handle(&self, ctx: SharedContext, next: Next) -> Result<RpcReply> {
        let (method, request_id) = {
            let guard = ctx.lock();
            (guard.method, guard.request_id.clone().unwrap_or_default())
        };
        tracing::debug!(method, request_id = %request_id, "rpc start");

        let started = Instant::now();
        let result = next.run(ctx).await;
        let duration_ms = started.elapsed().as_millis();

        match &result {
            Ok(_) => {
                tracing::info!(method, request_id = %request_id, duration_ms, "rpc complete");
            }
            Err(err) => {
                tracing::warn!(
                    method,
                    request_id = %request_id,
                    duration_ms,
                    error = %err,
                    "rpc failed"
                );
            }
        }
        result
    }
}
