//! JSON-RPC 2.0 envelope types and error codes

use objstore_common::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Malformed JSON
pub const PARSE_ERROR: i32 = -32700;
/// Missing or wrong `jsonrpc` version, malformed envelope
pub const INVALID_REQUEST: i32 = -32600;
/// Unknown method
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Parameter validation failure
pub const INVALID_PARAMS: i32 = -32602;
/// Backend or internal failure
pub const INTERNAL_ERROR: i32 = -32603;

/// An incoming request envelope
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: Option<String>,
    pub method: Option<String>,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

/// A JSON-RPC error object
#[derive(Debug, Clone, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcError {
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Map a domain error to the nearest JSON-RPC code
    #[must_use]
    pub fn from_domain(err: &Error) -> Self {
        let code = if err.is_invalid_argument()
            || matches!(err, Error::BackendNotFound(_) | Error::ArchiveDestinationNil)
        {
            INVALID_PARAMS
        } else {
            INTERNAL_ERROR
        };
        Self::new(code, err.to_string())
    }
}

/// An outgoing response envelope
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Value,
}

impl RpcResponse {
    /// A success response
    #[must_use]
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            result: Some(result),
            error: None,
            id,
        }
    }

    /// An error response
    #[must_use]
    pub fn error(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            result: None,
            error: Some(error),
            id,
        }
    }
}
