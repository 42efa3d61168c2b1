// Reelforge server: loads config, wires the pipeline and serves the HTTP API.

use clap::Parser;
use reelforge_core::ReelforgeConfig;
use reelforge_server::http::create_router;
use reelforge_server::startup::{build_state, init_tracing, open_store};
use tokio::signal;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "reelforge-server")]
#[command(about = "Reelforge production pipeline server", long_about = None)]
struct Args {
    /// Configuration file (JSON, TOML or YAML)
    #[arg(short, long, env = "REELFORGE_CONFIG")]
    config: Option<String>,

    /// Override the listening port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = ReelforgeConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    init_tracing(&config.logging);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting Reelforge");

    let store = open_store(&config)?;
    let state = build_state(&config, store).await?;
    let app = create_router(state, config.server.enable_cors);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    info!("All services stopped");
    Ok(())
}

/// Wait for shutdown signal
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
