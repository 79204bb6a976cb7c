use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use drawbridge_api::config::ServerConfig;
use drawbridge_api::router::{build_tool_router, build_worker_router};
use drawbridge_api::state::AppState;
use drawbridge_api::ws;
use drawbridge_broker::reaper;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "drawbridge_api=debug,drawbridge_broker=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = config.port,
        worker_port = config.worker_port,
        task_timeout_secs = config.task_timeout_secs,
        "Loaded server configuration",
    );

    // --- App state ---
    let state = AppState::new(config.clone());
    let hub = Arc::clone(&state.hub);

    // --- Heartbeat ---
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&hub), config.heartbeat_interval());

    // --- Reaper ---
    let cancel = CancellationToken::new();
    let reaper_handle = tokio::spawn(reaper::run(
        Arc::clone(&hub),
        config.reaper_interval(),
        config.task_retention(),
        cancel.clone(),
    ));

    // --- Routers ---
    let tool_app = build_tool_router(state.clone(), &config);
    let worker_app = build_worker_router(state);

    // --- Start servers ---
    let ip = config.host.parse().expect("Invalid HOST address");
    let tool_addr = SocketAddr::new(ip, config.port);
    let worker_addr = SocketAddr::new(ip, config.worker_port);

    let tool_listener = tokio::net::TcpListener::bind(tool_addr)
        .await
        .expect("Failed to bind tool address");
    let worker_listener = tokio::net::TcpListener::bind(worker_addr)
        .await
        .expect("Failed to bind worker address");
    tracing::info!(%tool_addr, %worker_addr, "Starting servers");

    // Both servers stop together on the first termination signal.
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    let tool_shutdown = cancel.clone();
    let tool_server = async move {
        axum::serve(tool_listener, tool_app)
            .with_graceful_shutdown(async move { tool_shutdown.cancelled().await })
            .await
    };

    // Worker sockets never finish on their own, so close them before the
    // worker server waits for in-flight connections.
    let worker_shutdown = cancel.clone();
    let worker_hub = Arc::clone(&hub);
    let worker_server = async move {
        axum::serve(worker_listener, worker_app)
            .with_graceful_shutdown(async move {
                worker_shutdown.cancelled().await;
                worker_hub.shutdown_all().await;
            })
            .await
    };

    tokio::try_join!(tool_server, worker_server).expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Servers stopped accepting connections, cleaning up");

    let _ = tokio::time::timeout(Duration::from_secs(5), reaper_handle).await;
    tracing::info!("Reaper stopped");

    let remaining = hub.client_count().await;
    tracing::info!(remaining, "Closing remaining worker connections");
    hub.shutdown_all().await;

    heartbeat_handle.abort();
    tracing::info!("Heartbeat task stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
