//! Unix domain socket server
//!
//! One task per connection; requests on a connection are handled
//! serially (no pipelining). Shutdown stops accepting, drains in-flight
//! connections, then unlinks the socket file.

use crate::handlers::MethodHandler;
use objstore_common::Result;
use objstore_store::Facade;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Default socket path
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/objstore.sock";

/// Default socket mode (owner + group read/write)
pub const DEFAULT_SOCKET_MODE: u32 = 0o660;

/// Server settings
#[derive(Clone, Debug)]
pub struct IpcServerConfig {
    /// Filesystem path of the listening socket
    pub socket_path: PathBuf,
    /// Permissions applied to the socket file
    pub socket_mode: u32,
}

impl Default for IpcServerConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            socket_mode: DEFAULT_SOCKET_MODE,
        }
    }
}

/// The JSON-RPC server over AF_UNIX
pub struct IpcServer {
    handler: Arc<MethodHandler>,
    config: IpcServerConfig,
}

impl IpcServer {
    #[must_use]
    pub fn new(facade: Arc<Facade>, config: IpcServerConfig) -> Self {
        Self {
            handler: Arc::new(MethodHandler::new(facade)),
            config,
        }
    }

    /// Run the accept loop until `shutdown` fires, then drain and unlink
    /// the socket file.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        let path = &self.config.socket_path;
        // A stale socket from a previous process blocks bind
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let listener = UnixListener::bind(path)?;
        set_socket_mode(path, self.config.socket_mode)?;
        tracing::info!(path = %path.display(), "ipc server listening");

        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _addr)) => {
                            let handler = self.handler.clone();
                            connections.spawn(handle_connection(handler, stream));
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "ipc accept failed");
                        }
                    }
                }
                () = shutdown.cancelled() => break,
            }
        }

        // Stop accepting, let in-flight connections drain to EOF
        drop(listener);
        while connections.join_next().await.is_some() {}
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        tracing::info!("ipc server stopped");
        Ok(())
    }
}

async fn handle_connection(handler: Arc<MethodHandler>, stream: UnixStream) {
    let (read_half, mut write_half) = stream.into_split();
    // read_line grows the buffer as needed, so multi-MiB base64 payloads
    // (10 MiB and beyond) are accepted
    let mut reader = BufReader::with_capacity(64 * 1024, read_half);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let response = handler.dispatch_line(trimmed).await;
                let mut payload = match serde_json::to_vec(&response) {
                    Ok(payload) => payload,
                    Err(err) => {
                        tracing::error!(error = %err, "failed to encode ipc response");
                        break;
                    }
                };
                payload.push(b'\n');
                if write_half.write_all(&payload).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                tracing::debug!(error = %err, "ipc connection read failed");
                break;
            }
        }
    }
}

#[cfg(unix)]
fn set_socket_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_socket_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
