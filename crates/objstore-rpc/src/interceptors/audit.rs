//! Audit event emission
//!
//! Emits one event per mutation after the downstream chain finishes.
//! Sink errors never fail the operation.

use crate::audit::{AuditEvent, AuditResult, AuditSink};
use crate::context::SharedContext;
use crate::interceptor::{Interceptor, Next, RpcReply};
use async_trait::async_trait;
use chrono::Utc;
use objstore_common::Result;
use std::sync::Arc;

pub struct AuditInterceptor {
    sink: Arc<dyn AuditSink>,
}

impl AuditInterceptor {
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Interceptor for AuditInterceptor {
    fn name(&self) -> &'static str {
        "audit"
    }

    async fn handle(&self, ctx: SharedContext, next: Next) -> Result<RpcReply> {
        let result = next.run(ctx.clone()).await;

        let event = {
            let guard = ctx.lock();
            if !guard.mutation {
                return result;
            }
            AuditEvent {
                event_type: guard.method.to_string(),
                user_id: guard.principal.as_ref().map(|p| p.id.clone()),
                principal: guard.principal.as_ref().map(|p| p.name.clone()),
                backend: guard.backend.clone(),
                key: guard.key.clone(),
                client_ip: guard.client_ip.clone(),
                request_id: guard.request_id.clone(),
                bytes_transferred: guard.bytes_transferred,
                result: if result.is_ok() {
                    AuditResult::Success
                } else {
                    AuditResult::Failure
                },
                error: result.as_ref().err().map(ToString::to_string),
                timestamp: Utc::now(),
            }
        };
        if let Err(err) = self.sink.record(event) {
            tracing::warn!(error = %err, "audit sink write failed");
        }
        result
    }
}
