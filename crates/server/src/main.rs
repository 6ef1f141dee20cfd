use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use provisor_server::api::AppState;
use provisor_server::cleanup::run_retention_cleanup;
use provisor_server::config::ProvisorConfig;
use provisor_server::handler_factory::create_handlers;
use provisor_server::publisher::create_publisher;
use provisor_server::state_factory::create_state;
use provisor_worker::{MemoryChannel, WorkerBuilder, WorkerMetrics};

/// Provisor subscription-lifecycle orchestration server.
#[derive(Parser, Debug)]
#[command(
    name = "provisor-server",
    about = "Standalone host for the Provisor orchestration worker"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "provisor.toml")]
    config: String,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if !std::path::Path::new(&cli.config).exists() {
        info!(path = %cli.config, "config file not found, using defaults");
    }
    let config = ProvisorConfig::load(&cli.config)?;
    let worker_config = config.worker_config();

    let store = create_state(&config.state).await?;
    let publisher = create_publisher(&config.outbound)?;
    let handlers = create_handlers(&config.handlers, worker_config.dispatcher.handler_timeout)?;
    let inbound = Arc::new(MemoryChannel::new());
    let metrics = Arc::new(WorkerMetrics::default());

    let worker = Arc::new(
        WorkerBuilder::new()
            .channel(inbound.clone())
            .publisher(publisher)
            .store(Arc::clone(&store))
            .handlers(handlers)
            .config(worker_config)
            .metrics(Arc::clone(&metrics))
            .build()?,
    );
    info!(
        source = %config.inbound.source,
        destination = %config.outbound.destination,
        "orchestration worker configured"
    );

    let shutdown = CancellationToken::new();
    let worker_task = tokio::spawn(Arc::clone(&worker).run(shutdown.clone()));
    let cleanup_task = tokio::spawn(run_retention_cleanup(
        Arc::clone(&store),
        config.cleanup_interval(),
        shutdown.clone(),
    ));

    let state = AppState {
        inbound: Arc::clone(&inbound),
        guard: Arc::clone(worker.guard()),
        metrics,
    };
    let app = provisor_server::api::router(state);

    // Resolve the bind address (CLI overrides take precedence).
    let host = cli.host.unwrap_or_else(|| config.server.host.clone());
    let port = cli.port.unwrap_or(config.server.port);
    let addr = format!("{host}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "provisor-server listening");

    // Serve with graceful shutdown on SIGINT / SIGTERM.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop taking new messages and let in-flight actions finish.
    inbound.close();
    shutdown.cancel();
    let shutdown_timeout = config.shutdown_timeout();
    info!(
        timeout_secs = shutdown_timeout.as_secs(),
        "waiting for in-flight actions..."
    );
    if tokio::time::timeout(shutdown_timeout, worker_task).await.is_err() {
        warn!(
            timeout_secs = shutdown_timeout.as_secs(),
            "shutdown timeout exceeded, unfinished actions will be redelivered"
        );
    }
    if let Err(e) = cleanup_task.await {
        warn!(error = %e, "retention cleanup task failed");
    }

    info!("provisor-server shut down");
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
