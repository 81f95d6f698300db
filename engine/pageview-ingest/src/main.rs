//! Pageview Ingest Service
//!
//! Serves `/health` and `/ingest` until SIGINT or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use pageview_ingest::{
    build_live_service, config, create_routes, initialize_logging_with_config,
    setup_signal_handlers,
};

/// HTTP service that loads daily Wikipedia pageviews into BigQuery
#[derive(Parser)]
#[command(name = "pageview-ingest")]
#[command(about = "Load daily Wikipedia pageview counts into BigQuery")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "INGEST_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Load configuration
    let mut config = config::load_config(cli.config.as_deref())
        .context("Failed to load service configuration")?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.validate().context("Invalid service configuration")?;

    // Initialize logging
    initialize_logging_with_config(&config.logging.level, &config.logging.format)?;

    info!("Starting Pageview Ingest Service v{}", env!("CARGO_PKG_VERSION"));

    let addr = config.server_addr()?;
    let config = Arc::new(config);
    info!(
        "Writing to {} (project {}, failure policy {:?})",
        config.bigquery.full_table_id()?,
        config.wikimedia.project,
        config.ingest.failure_policy
    );

    let service = Arc::new(build_live_service(config)?);
    let routes = create_routes(service);

    let shutdown = setup_signal_handlers()?;
    let (bound, server) = warp::serve(routes)
        .try_bind_with_graceful_shutdown(addr, async move {
            let signal = shutdown.recv().await;
            info!("Shutdown signal received ({}), draining connections", signal);
        })
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Listening on http://{}", bound);
    server.await;

    info!("Pageview Ingest Service shutdown complete");
    Ok(())
}
