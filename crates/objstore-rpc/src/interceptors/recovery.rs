//! Panic recovery
//!
//! Outermost layer: a panic anywhere downstream becomes a generic
//! internal error instead of tearing down the connection task.

use crate::context::SharedContext;
use crate::interceptor::{Interceptor, Next, RpcReply};
use async_trait::async_trait;
use futures::FutureExt;
use objstore_common::{Error, Result};
use std::panic::AssertUnwindSafe;

#[derive(Default)]
pub struct RecoveryInterceptor;

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[async_trait]
impl Interceptor for RecoveryInterceptor {
    fn name(&self) -> &'static str {
        "recovery"
    }

    async fn handle(&self, ctx: SharedContext, next: Next) -> Result<RpcReply> {
        match AssertUnwindSafe(next.run(ctx.clone())).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload);
                let method = ctx.lock().method;
                tracing::error!(method, panic = %message, "handler panicked");
                Err(Error::internal("internal server error"))
            }
        }
    }
}
