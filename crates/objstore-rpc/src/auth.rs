//! Call authentication
//!
//! Extracts credentials from call metadata and attaches a principal to
//! the context. A no-op authenticator is supplied for deployments
//! without auth.

use crate::context::CallContext;
use async_trait::async_trait;
use objstore_common::{Error, Principal, Result};
use std::collections::HashMap;

/// Turns call credentials into a principal
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticate the call; failure maps to `unauthenticated`
    async fn authenticate(&self, ctx: &CallContext) -> Result<Principal>;
}

/// Accepts every call as the anonymous principal
#[derive(Default)]
pub struct NoopAuthenticator;

#[async_trait]
impl Authenticator for NoopAuthenticator {
    async fn authenticate(&self, _ctx: &CallContext) -> Result<Principal> {
        Ok(Principal::anonymous())
    }
}

/// Static bearer-token table
#[derive(Default)]
pub struct TokenAuthenticator {
    tokens: HashMap<String, Principal>,
}

impl TokenAuthenticator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token for a principal
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.tokens.insert(token.into(), principal);
        self
    }
}

#[async_trait]
impl Authenticator for TokenAuthenticator {
    async fn authenticate(&self, ctx: &CallContext) -> Result<Principal> {
        let token = ctx
            .bearer_token
            .as_deref()
            .ok_or_else(|| Error::Unauthenticated("missing bearer token".into()))?;
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| Error::Unauthenticated("unknown bearer token".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_authenticator() {
        let ctx = CallContext::new("Put");
        let principal = NoopAuthenticator.authenticate(&ctx).await.unwrap();
        assert_eq!(principal, Principal::anonymous());
    }

    #[tokio::test]
    async fn test_token_authenticator() {
        let auth = TokenAuthenticator::new()
            .with_token("secret", Principal::new("u1", "alice"));

        let mut ctx = CallContext::new("Put");
        assert!(matches!(
            auth.authenticate(&ctx).await,
            Err(Error::Unauthenticated(_))
        ));

        ctx.bearer_token = Some("wrong".into());
        assert!(auth.authenticate(&ctx).await.is_err());

        ctx.bearer_token = Some("secret".into());
        let principal = auth.authenticate(&ctx).await.unwrap();
        assert_eq!(principal.id, "u1");
    }
}
