//! Authentication
//!
//! Attaches a principal to the context or short-circuits with
//! `unauthenticated`; nothing downstream runs on failure.

use crate::auth::Authenticator;
use crate::context::SharedContext;
use crate::interceptor::{Interceptor, Next, RpcReply};
use async_trait::async_trait;
use objstore_common::Result;
use std::sync::Arc;

pub struct AuthInterceptor {
    authenticator: Arc<dyn Authenticator>,
}

impl AuthInterceptor {
    #[must_use]
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        Self { authenticator }
    }
}

#[async_trait]
impl Interceptor for AuthInterceptor {
    fn name(&self) -> &'static str {
        "authentication"
    }

    async fn handle(&self, ctx: SharedContext, next: Next) -> Result<RpcReply> {
        let snapshot = ctx.lock().clone();
        let principal = self.authenticator.authenticate(&snapshot).await?;
        ctx.lock().principal = Some(principal);
        next.run(ctx).await
    }
}
