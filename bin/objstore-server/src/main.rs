//! ObjStore Server
//!
//! This binary wires the local backend, lifecycle engine, replication
//! engine, and both wire surfaces (streaming RPC + Unix JSON-RPC) into
//! one process.

use anyhow::Result;
use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use clap::Parser;
use objstore_common::Principal;
use objstore_ipc::{IpcServer, IpcServerConfig};
use objstore_replication::ReplicationManager;
use objstore_rpc::interceptors::RateLimitConfig;
use objstore_rpc::{
    rpc_metrics, Authenticator, NoopAuthenticator, ObjectStoreService, RpcConfig,
    TokenAuthenticator, TracingAuditSink,
};
use objstore_store::{Facade, FileChangeLog, LocalStore, ObjectStore};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Prometheus metrics endpoint handler
async fn metrics_handler() -> impl IntoResponse {
    let metrics = rpc_metrics().export_prometheus();
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics,
    )
}

/// Health endpoint handler
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[derive(Parser, Debug)]
#[command(name = "objstore-server")]
#[command(about = "ObjStore pluggable object storage service")]
#[command(version)]
struct Args {
    /// Storage root directory for the local backend
    #[arg(short, long, default_value = "/var/lib/objstore")]
    data_dir: String,

    /// Listen address for the streaming RPC server
    #[arg(long, default_value = "0.0.0.0:9100")]
    grpc_listen: String,

    /// Unix socket path for the local JSON-RPC server
    #[arg(long, default_value = "/var/run/objstore.sock")]
    socket_path: PathBuf,

    /// Unix socket permissions (octal)
    #[arg(long, default_value = "660")]
    socket_mode: String,

    /// Listen address for the metrics/health HTTP endpoint (empty disables)
    #[arg(long, default_value = "0.0.0.0:9190")]
    metrics_listen: String,

    /// Get frame chunk size in bytes
    #[arg(long, default_value_t = 64 * 1024)]
    chunk_size: usize,

    /// Start the periodic lifecycle engine
    #[arg(long, default_value_t = false)]
    run_lifecycle: bool,

    /// Lifecycle manager type: memory or persistent
    #[arg(long, default_value = "memory")]
    lifecycle_manager: String,

    /// Changelog file path (empty disables mutation recording)
    #[arg(long, default_value = "")]
    changelog_file: String,

    /// Bearer token accepted by the RPC server (empty disables auth)
    #[arg(long, default_value = "")]
    auth_token: String,

    /// Sustained requests/second per {method, client} (0 disables)
    #[arg(long, default_value_t = 0.0)]
    rate_limit_rps: f64,

    /// Rate limit burst capacity
    #[arg(long, default_value_t = 200)]
    rate_limit_burst: u32,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ObjStore server");
    info!("Data directory: {}", args.data_dir);

    // Configure the local backend
    let local = LocalStore::new();
    let mut settings = HashMap::from([
        ("path".to_string(), args.data_dir.clone()),
        (
            "lifecycleManagerType".to_string(),
            args.lifecycle_manager.clone(),
        ),
    ]);
    if args.run_lifecycle {
        settings.insert("runLifecycle".to_string(), "true".to_string());
        info!("Lifecycle engine is ENABLED ({})", args.lifecycle_manager);
    }
    local.configure(&settings).await?;

    // Changelog enables incremental replication
    let mut change_feed = None;
    if !args.changelog_file.is_empty() {
        let changelog = Arc::new(FileChangeLog::open(&args.changelog_file)?);
        local.set_change_log(Some(changelog.clone()));
        change_feed = Some(changelog);
        info!("Changelog: {}", args.changelog_file);
    }

    // Install the backends into the process-wide facade
    let facade = Facade::global();
    facade.initialize(
        HashMap::from([(
            "local".to_string(),
            Arc::new(local.clone()) as Arc<dyn ObjectStore>,
        )]),
        "local",
    )?;

    // Replication engine, resolved through the facade
    let replication = ReplicationManager::new(facade.clone());
    if let Some(feed) = change_feed {
        replication.set_change_feed("local", feed);
    }
    local.set_replication_manager(Some(replication.clone()));
    replication.start();

    // Streaming RPC service
    let authenticator: Arc<dyn Authenticator> = if args.auth_token.is_empty() {
        info!("Authentication is DISABLED");
        Arc::new(NoopAuthenticator)
    } else {
        info!("Authentication is ENABLED (bearer token)");
        Arc::new(
            TokenAuthenticator::new()
                .with_token(args.auth_token.clone(), Principal::new("admin", "admin")),
        )
    };
    let rate_limit = (args.rate_limit_rps > 0.0).then(|| RateLimitConfig {
        requests_per_second: args.rate_limit_rps,
        burst: args.rate_limit_burst,
    });
    let service = ObjectStoreService::new(
        facade.clone(),
        RpcConfig {
            chunk_size: args.chunk_size,
            rate_limit,
            authenticator,
            audit_sink: Arc::new(TracingAuditSink),
            metrics: rpc_metrics(),
            extra_interceptors: Vec::new(),
        },
    );

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down...");
            shutdown.cancel();
        });
    }

    // Unix JSON-RPC server
    let socket_mode = u32::from_str_radix(&args.socket_mode, 8)
        .map_err(|e| anyhow::anyhow!("invalid socket mode {}: {}", args.socket_mode, e))?;
    info!("IPC socket: {}", args.socket_path.display());
    let ipc = IpcServer::new(
        facade.clone(),
        IpcServerConfig {
            socket_path: args.socket_path.clone(),
            socket_mode,
        },
    );
    let ipc_task = tokio::spawn(ipc.serve(shutdown.clone()));

    // Metrics/health HTTP endpoint
    if !args.metrics_listen.is_empty() {
        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
            .layer(TraceLayer::new_for_http());
        let addr: SocketAddr = args.metrics_listen.parse()?;
        let listener = TcpListener::bind(addr).await?;
        info!("Metrics endpoint: http://{addr}/metrics");
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
    }

    // Streaming RPC server runs in the foreground
    let addr: SocketAddr = args.grpc_listen.parse()?;
    info!("Starting RPC server on {addr}");
    tonic::transport::Server::builder()
        .add_service(service.into_server())
        .serve_with_shutdown(addr, {
            let shutdown = shutdown.clone();
            async move { shutdown.cancelled().await }
        })
        .await?;

    shutdown.cancel();
    ipc_task.await??;
    info!("Server shut down gracefully");
    Ok(())
}
