use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tripsync_server::{app_router, build_state, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "tripsync-server")]
#[command(about = "Document store for the collaborative trip planner")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "TRIPSYNC_LISTEN", default_value = "127.0.0.1:8787")]
    listen: SocketAddr,

    /// SQLite database file
    #[arg(long, env = "TRIPSYNC_DB_PATH", default_value = "./data/tripsync.db")]
    db_path: PathBuf,

    /// Default log level (overridden by RUST_LOG)
    #[arg(long, env = "TRIPSYNC_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Longest long-poll a client may request, in seconds
    #[arg(long, env = "TRIPSYNC_LONG_POLL_MAX_SECS", default_value_t = 30)]
    long_poll_max_secs: u64,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig {
        listen: args.listen,
        db_path: args.db_path,
        long_poll_max: Duration::from_secs(args.long_poll_max_secs.max(1)),
    };
    let state = build_state(&config).context("failed to initialize storage")?;

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    info!("Tripsync server listening on {}", config.listen);

    axum::serve(listener, app_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
