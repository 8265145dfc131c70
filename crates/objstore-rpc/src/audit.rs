//! Audit events and sinks
//!
//! Every mutation emits one event. Sink failures never fail the
//! operation; the audit interceptor logs and moves on.

use chrono::{DateTime, Utc};
use objstore_common::Result;
use parking_lot::Mutex;

/// Outcome recorded in an audit event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuditResult {
    Success,
    Failure,
}

impl AuditResult {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// One audited mutation
#[derive(Clone, Debug)]
pub struct AuditEvent {
    /// Mutation kind (the RPC method name)
    pub event_type: String,
    /// Principal id, when authenticated
    pub user_id: Option<String>,
    /// Principal display name, when authenticated
    pub principal: Option<String>,
    /// Backend the mutation targeted (empty = default)
    pub backend: String,
    /// Object key the mutation targeted
    pub key: String,
    /// Remote peer address, when known
    pub client_ip: Option<String>,
    /// Request id attached by the chain
    pub request_id: Option<String>,
    /// Payload bytes moved
    pub bytes_transferred: u64,
    /// Success or failure
    pub result: AuditResult,
    /// Error description on failure
    pub error: Option<String>,
    /// When the mutation finished
    pub timestamp: DateTime<Utc>,
}

/// Destination for audit events
pub trait AuditSink: Send + Sync {
    /// Record one event; errors are swallowed by the caller
    fn record(&self, event: AuditEvent) -> Result<()>;
}

/// Sink writing structured audit records to the tracing pipeline
#[derive(Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) -> Result<()> {
        tracing::info!(
            target: "objstore::audit",
            event_type = %event.event_type,
            user_id = event.user_id.as_deref().unwrap_or("-"),
            backend = %event.backend,
            key = %event.key,
            client_ip = event.client_ip.as_deref().unwrap_or("-"),
            request_id = event.request_id.as_deref().unwrap_or("-"),
            bytes = event.bytes_transferred,
            result = event.result.as_str(),
            error = event.error.as_deref().unwrap_or(""),
            "audit"
        );
        Ok(())
    }
}

/// In-memory sink for tests
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events, in order
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) -> Result<()> {
        self.events.lock().push(event);
        Ok(())
    }
}
