//! Per-call context
//!
//! Carried through the interceptor chain; interceptors attach the request
//! id and principal, the handler records audit details.

use objstore_common::Principal;
use parking_lot::Mutex;
use std::sync::Arc;

/// Context shared between the interceptor chain and the handler
pub type SharedContext = Arc<Mutex<CallContext>>;

/// Everything the chain knows about one call
#[derive(Clone, Debug)]
pub struct CallContext {
    /// RPC method name, e.g. `Put`
    pub method: &'static str,
    /// Client identifier used for rate limiting (header or peer address)
    pub client_id: String,
    /// Remote peer address, when known
    pub client_ip: Option<String>,
    /// Unique id for this call; generated when the client sends none
    pub request_id: Option<String>,
    /// Bearer token from call metadata, when present
    pub bearer_token: Option<String>,
    /// Identity attached by the authentication interceptor
    pub principal: Option<Principal>,
    /// Backend the call targets (empty = default)
    pub backend: String,
    /// Object key the call targets, when applicable
    pub key: String,
    /// True for Put/Delete/Archive/UpdateMetadata; drives auditing
    pub mutation: bool,
    /// Payload bytes moved by the call, for audit events
    pub bytes_transferred: u64,
}

impl CallContext {
    /// Create a context for a method call
    #[must_use]
    pub fn new(method: &'static str) -> Self {
        Self {
            method,
            client_id: "unknown".to_string(),
            client_ip: None,
            request_id: None,
            bearer_token: None,
            principal: None,
            backend: String::new(),
            key: String::new(),
            mutation: false,
            bytes_transferred: 0,
        }
    }

    /// Mark this call as a mutation (audited)
    #[must_use]
    pub fn mutation(mut self) -> Self {
        self.mutation = true;
        self
    }

    /// Wrap into the shared form the chain passes around
    #[must_use]
    pub fn shared(self) -> SharedContext {
        Arc::new(Mutex::new(self))
    }
}
