//! Request-id attachment
//!
//! Generates a unique id for the call when the client supplied none, so
//! downstream logging and audit always have one to correlate on.

use crate::context::SharedContext;
use crate::interceptor::{Interceptor, Next, RpcReply};
use async_trait::async_trait;
use objstore_common::Result;
use uuid::Uuid;

#[derive(Default)]
pub struct RequestIdInterceptor;

#[async_trait]
impl Interceptor for RequestIdInterceptor {
    fn name(&self) -> &'static str {
        "request-id"
    }

    async fn handle(&self, ctx: SharedContext, next: Next) -> Result<RpcReply> {
        {
            let mut guard = ctx.lock();
            if guard.request_id.is_none() {
                guard.request_id = Some(Uuid::new_v4().to_string());
            }
        }
        next.run(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CallContext;
    use crate::interceptor::InterceptorChain;
    use objstore_proto::v1 as pb;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_generates_id_when_absent() {
        let chain = InterceptorChain::new(vec![Arc::new(RequestIdInterceptor)]);
        let ctx = CallContext::new("Put").shared();
        let seen = ctx.clone();
        chain
            .execute(
                ctx.clone(),
                Box::new(move |handler_ctx| {
                    Box::pin(async move {
                        // The handler observes the generated id
                        assert!(handler_ctx.lock().request_id.is_some());
                        Ok(RpcReply::Put(pb::PutResponse {}))
                    })
                }),
            )
            .await
            .unwrap();
        assert!(seen.lock().request_id.is_some());
    }

    #[tokio::test]
    async fn test_keeps_client_supplied_id() {
        let chain = InterceptorChain::new(vec![Arc::new(RequestIdInterceptor)]);
        let mut call = CallContext::new("Put");
        call.request_id = Some("client-1".into());
        let ctx = call.shared();
        chain
            .execute(
                ctx.clone(),
                Box::new(|_| Box::pin(async { Ok(RpcReply::Put(pb::PutResponse {})) })),
            )
            .await
            .unwrap();
        assert_eq!(ctx.lock().request_id.as_deref(), Some("client-1"));
    }
}
