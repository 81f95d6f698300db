//! Service configuration management
//!
//! Configuration is layered: built-in defaults, then an optional TOML file, then
//! `INGEST__SECTION__KEY` environment variables, then the plain variables used by the
//! Cloud Run deployment (`PROJECT_ID`, `BQ_TABLE`, `PORT`, `LOG_LEVEL`).

use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};
use crate::ingest::{validate_page_name, validate_project};

/// Default Wikimedia REST API root
pub const DEFAULT_WIKIMEDIA_BASE_URL: &str = "https://wikimedia.org/api/rest_v1";

/// Default BigQuery REST API root
pub const DEFAULT_BIGQUERY_API_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Token endpoint of the GCE / Cloud Run metadata server
pub const DEFAULT_METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Wikimedia keeps daily pageviews from mid-2015 onwards
pub const MAX_LOOKBACK_DAYS: u32 = 3650;

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct IngestConfig {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Stats provider configuration
    pub wikimedia: WikimediaConfig,

    /// Warehouse sink configuration
    pub bigquery: BigQueryConfig,

    /// Ingest behavior
    pub ingest: IngestSettings,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,
}

/// Wikimedia pageviews API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WikimediaConfig {
    /// REST API root, without trailing slash
    pub base_url: String,

    /// Default project when the caller does not pass one
    pub project: String,

    /// Access method segment (all-access, desktop, mobile-app, mobile-web)
    pub access: String,

    /// Agent segment (user, spider, automated, all-agents)
    pub agent: String,

    /// User-Agent sent on every request; Wikimedia asks for a contact address in it
    pub user_agent: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// How many days before the invocation date to query
    pub lookback_days: u32,
}

/// BigQuery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BigQueryConfig {
    /// GCP project that owns the dataset
    pub project_id: String,

    /// Target table as `dataset.table`
    pub table: String,

    /// REST API root, without trailing slash
    pub api_base_url: String,

    /// Static access token (local development); the metadata server is used when unset
    pub access_token: Option<String>,

    /// Metadata server token endpoint
    pub metadata_token_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// What to do when a single page fetch fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// First failure aborts the invocation before anything is written
    #[default]
    AllOrNothing,
    /// Failed pages are reported, the remaining pages are still written
    PartialSuccess,
}

/// Ingest behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Pages used when the request carries no `pages` parameter
    pub default_pages: Vec<String>,

    /// Upper bound on pages per invocation
    pub max_pages: usize,

    /// Per-page failure handling
    pub failure_policy: FailurePolicy,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

impl Default for WikimediaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_WIKIMEDIA_BASE_URL.to_string(),
            project: "en.wikipedia.org".to_string(),
            access: "all-access".to_string(),
            agent: "user".to_string(),
            user_agent: format!("pageview-ingest/{} (daily pageview loader)", env!("CARGO_PKG_VERSION")),
            timeout_secs: 30,
            lookback_days: 1,
        }
    }
}

impl Default for BigQueryConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            table: "raw.wikipedia_pageviews".to_string(),
            api_base_url: DEFAULT_BIGQUERY_API_BASE_URL.to_string(),
            access_token: None,
            metadata_token_url: DEFAULT_METADATA_TOKEN_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            default_pages: vec!["Stockholm".to_string(), "Sweden".to_string()],
            max_pages: 50,
            failure_policy: FailurePolicy::AllOrNothing,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "json".to_string() }
    }
}

impl BigQueryConfig {
    /// Split `table` into `(dataset, table)`
    pub fn table_ref(&self) -> Result<(String, String)> {
        let mut parts = self.table.split('.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(dataset), Some(table), None) if !dataset.is_empty() && !table.is_empty() => {
                Ok((dataset.to_string(), table.to_string()))
            }
            _ => Err(IngestError::config(format!(
                "bigquery.table must look like 'dataset.table', got '{}'",
                self.table
            ))),
        }
    }

    /// Fully qualified `project.dataset.table`
    pub fn full_table_id(&self) -> Result<String> {
        let (dataset, table) = self.table_ref()?;
        Ok(format!("{}.{}.{}", self.project_id, dataset, table))
    }
}

impl IngestConfig {
    /// Get the server address
    pub fn server_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| IngestError::config(format!("invalid server address: {e}")))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.server_addr()?;

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => return Err(IngestError::config(format!("Invalid log level: {other}"))),
        }

        match self.logging.format.as_str() {
            "json" | "pretty" | "compact" => {}
            other => return Err(IngestError::config(format!("Invalid log format: {other}"))),
        }

        reqwest::Url::parse(&self.wikimedia.base_url)
            .map_err(|e| IngestError::config(format!("Invalid wikimedia.base_url: {e}")))?;
        reqwest::Url::parse(&self.bigquery.api_base_url)
            .map_err(|e| IngestError::config(format!("Invalid bigquery.api_base_url: {e}")))?;
        reqwest::Url::parse(&self.bigquery.metadata_token_url).map_err(|e| {
            IngestError::config(format!("Invalid bigquery.metadata_token_url: {e}"))
        })?;

        validate_project(&self.wikimedia.project).map_err(|e| IngestError::config(e.to_string()))?;

        if self.wikimedia.user_agent.trim().is_empty() {
            return Err(IngestError::config("wikimedia.user_agent must not be empty"));
        }

        if self.wikimedia.timeout_secs == 0 || self.bigquery.timeout_secs == 0 {
            return Err(IngestError::config("timeouts must be at least one second"));
        }

        if self.wikimedia.lookback_days > MAX_LOOKBACK_DAYS {
            return Err(IngestError::config(format!(
                "wikimedia.lookback_days must be at most {MAX_LOOKBACK_DAYS}, got {}",
                self.wikimedia.lookback_days
            )));
        }

        if self.bigquery.project_id.trim().is_empty() {
            return Err(IngestError::config(
                "bigquery.project_id is not set (PROJECT_ID or INGEST__BIGQUERY__PROJECT_ID)",
            ));
        }

        self.bigquery.table_ref()?;

        if self.ingest.max_pages == 0 {
            return Err(IngestError::config("ingest.max_pages must be at least 1"));
        }

        if self.ingest.default_pages.is_empty() {
            return Err(IngestError::config("ingest.default_pages must not be empty"));
        }

        if self.ingest.default_pages.len() > self.ingest.max_pages {
            return Err(IngestError::config(format!(
                "ingest.default_pages has {} entries, more than ingest.max_pages ({})",
                self.ingest.default_pages.len(),
                self.ingest.max_pages
            )));
        }

        for page in &self.ingest.default_pages {
            validate_page_name(page).map_err(|e| IngestError::config(e.to_string()))?;
        }

        Ok(())
    }
}

/// Load configuration from an optional file and the process environment
pub fn load_config(path: Option<&Path>) -> Result<IngestConfig> {
    let mut builder = config::Config::builder();

    if let Some(path) = path {
        tracing::debug!("Loading configuration from file: {:?}", path);
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("INGEST").separator("__").try_parsing(true),
    );

    let mut config: IngestConfig = builder
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| IngestError::config(e.to_string()))?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;

    Ok(config)
}

/// Apply the plain environment variables used by the deployment
pub fn apply_env_overrides<F>(config: &mut IngestConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(project_id) = lookup("PROJECT_ID") {
        config.bigquery.project_id = project_id;
    }

    if let Some(table) = lookup("BQ_TABLE") {
        config.bigquery.table = table;
    }

    if let Some(port) = lookup("PORT") {
        config.server.port =
            port.parse().map_err(|_| IngestError::config(format!("Invalid PORT: {port}")))?;
    }

    if let Some(level) = lookup("LOG_LEVEL") {
        config.logging.level = level.to_lowercase();
    }

    if let Some(pages) = lookup("DEFAULT_PAGES") {
        config.ingest.default_pages = pages
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
    }

    Ok(())
}
