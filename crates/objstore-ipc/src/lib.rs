//! ObjStore IPC - JSON-RPC 2.0 over a Unix domain socket
//!
//! The local privileged surface: newline-delimited JSON-RPC 2.0 requests
//! over an AF_UNIX stream socket, with object bytes base64-encoded in
//! `data` fields.

pub mod handlers;
pub mod protocol;
pub mod server;

pub use handlers::MethodHandler;
pub use protocol::{RpcError, RpcRequest, RpcResponse};
pub use server::{IpcServer, IpcServerConfig, DEFAULT_SOCKET_MODE, DEFAULT_SOCKET_PATH};
