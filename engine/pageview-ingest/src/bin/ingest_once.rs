//! Run a single ingest invocation from the command line and print the result.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use pageview_ingest::{build_live_service, initialize_logging_with_config, load_configuration, IngestRequest};

#[derive(Parser)]
#[command(name = "ingest-once")]
#[command(about = "Fetch pageviews for a list of pages and append them to BigQuery once")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "INGEST_CONFIG")]
    config: Option<PathBuf>,

    /// Comma-separated page titles; the configured defaults when omitted
    #[arg(long)]
    pages: Option<String>,

    /// Wikimedia project, e.g. sv.wikipedia.org
    #[arg(long)]
    project: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = load_configuration(cli.config.as_deref())?;
    initialize_logging_with_config(&config.logging.level, "compact")?;

    let service = build_live_service(Arc::new(config))?;
    let request = IngestRequest {
        pages: cli.pages,
        project: cli.project,
        request_id: uuid::Uuid::new_v4().to_string(),
    };

    let result = service.ingest(request).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
