use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use logwell_config::ConfigLoader;
use logwell_core::Supervisor;
use logwell_server::{create_app, AppState};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments for the Logwell server.
#[derive(Parser, Debug)]
#[command(name = "logwell-server")]
#[command(about = "Label-indexed log aggregation server with live streaming fan-out")]
struct Args {
    /// Path to the YAML config file (defaults to ./logwell.yaml)
    #[arg(short, long, env = "LOGWELL_CONFIG")]
    config: Option<PathBuf>,

    /// Server port (overrides config)
    #[arg(short, long, env = "LOGWELL_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "logwell_server=debug,logwell_core=debug,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_config_path(path);
    }
    let mut config = loader.load()?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    let config = Arc::new(config);

    let supervisor = Arc::new(Supervisor::start(&config)?);
    let state = AppState::new(supervisor.clone(), config.clone());
    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "logwell server listening");

    // The HTTP surface closes first on shutdown; in-flight requests get
    // the configured grace period, then the core drains.
    let http_cancel = CancellationToken::new();
    let server = {
        let http_cancel = http_cancel.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { http_cancel.cancelled().await })
                .await
        })
    };

    shutdown_signal().await;
    info!("shutdown signal received, closing http surface");
    http_cancel.cancel();

    match tokio::time::timeout(config.shutdown.http_timeout(), server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(err))) => warn!(error = %err, "http server ended with an error"),
        Ok(Err(err)) => warn!(error = %err, "http server task ended abnormally"),
        Err(_) => warn!(
            budget_secs = config.shutdown.http_timeout_seconds,
            "http drain exceeded its budget"
        ),
    }

    supervisor.shutdown().await;
    info!("logwell server stopped");
    Ok(())
}

/// Completes on ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
