//! Pageview Ingest Service Library
//!
//! Fetches daily Wikipedia pageview counts for a list of pages and appends them
//! to a BigQuery table. The HTTP surface is two routes:
//!
//! - `GET /health` liveness probe
//! - `GET /ingest?pages=Stockholm,Sweden` one ingest invocation
//!
//! Every invocation is all-or-nothing by default: if any page fails to fetch,
//! nothing is written. Invocations are not idempotent; calling twice on the same
//! day appends the same rows twice.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

pub mod auth;
pub mod bigquery;
pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod models;
pub mod rest_api;
pub mod signals;
pub mod wikimedia;

#[cfg(test)]
mod test_support;

pub use bigquery::{BigQuerySink, RowSink};
pub use config::{FailurePolicy, IngestConfig};
pub use error::{IngestError, SinkError, StatsError};
pub use ingest::{IngestRequest, IngestService};
pub use logging::initialize_logging_with_config;
pub use models::{IngestResult, PageviewRecord};
pub use rest_api::create_routes;
pub use signals::setup_signal_handlers;
pub use wikimedia::{StatsProvider, WikimediaClient};

/// The service wired to Wikimedia and BigQuery
pub type LiveIngestService = IngestService<WikimediaClient, BigQuerySink>;

/// Load configuration from an optional file and environment variables, then validate it
pub fn load_configuration(path: Option<&Path>) -> Result<IngestConfig> {
    let config = config::load_config(path).context("Failed to load service configuration")?;
    config.validate().context("Invalid service configuration")?;
    Ok(config)
}

/// Build the service with live HTTP clients
pub fn build_live_service(config: Arc<IngestConfig>) -> Result<LiveIngestService> {
    let provider =
        WikimediaClient::new(&config.wikimedia).context("Failed to create Wikimedia client")?;
    let sink = BigQuerySink::new(&config.bigquery).context("Failed to create BigQuery sink")?;
    Ok(IngestService::new(config, provider, sink))
}
