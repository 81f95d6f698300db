//! BigQuery streaming-insert sink
//!
//! Rows go out in one `tabledata.insertAll` call. No `insertId` is attached, so
//! BigQuery performs no best-effort deduplication and repeated invocations append
//! repeated rows.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::TokenSource;
use crate::config::BigQueryConfig;
use crate::error::{IngestError, SinkError};
use crate::models::PageviewRecord;

/// Append-only bulk writer for pageview rows
#[async_trait::async_trait]
pub trait RowSink: Send + Sync {
    /// Append all rows in a single write, returning the number of rows accepted
    async fn append_rows(&self, rows: &[PageviewRecord]) -> Result<usize, SinkError>;

    /// Fully qualified destination table, used in logs and responses
    fn table_id(&self) -> &str;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllRequest<'a> {
    kind: &'static str,
    skip_invalid_rows: bool,
    ignore_unknown_values: bool,
    rows: Vec<InsertAllRow<'a>>,
}

#[derive(Serialize)]
struct InsertAllRow<'a> {
    json: &'a PageviewRecord,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<RowInsertErrors>,
}

#[derive(Debug, Deserialize)]
struct RowInsertErrors {
    #[serde(default)]
    index: u64,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// BigQuery `insertAll` client for one table
#[derive(Debug, Clone)]
pub struct BigQuerySink {
    client: Client,
    insert_url: String,
    table_id: String,
    tokens: TokenSource,
}

impl BigQuerySink {
    /// Create a new sink from configuration
    pub fn new(config: &BigQueryConfig) -> Result<Self, IngestError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| IngestError::config(format!("Failed to create HTTP client: {e}")))?;

        let tokens = TokenSource::from_config(
            config.access_token.as_deref(),
            &config.metadata_token_url,
            client.clone(),
        );

        Self::with_token_source(config, client, tokens)
    }

    /// Create a sink with an explicit token source
    pub fn with_token_source(
        config: &BigQueryConfig,
        client: Client,
        tokens: TokenSource,
    ) -> Result<Self, IngestError> {
        let (dataset, table) = config.table_ref()?;
        let insert_url = format!(
            "{}/projects/{}/datasets/{}/tables/{}/insertAll",
            config.api_base_url.trim_end_matches('/'),
            config.project_id,
            dataset,
            table
        );

        Ok(Self { client, insert_url, table_id: config.full_table_id()?, tokens })
    }

    /// Endpoint rows are posted to
    pub fn insert_url(&self) -> &str {
        &self.insert_url
    }
}

#[async_trait::async_trait]
impl RowSink for BigQuerySink {
    async fn append_rows(&self, rows: &[PageviewRecord]) -> Result<usize, SinkError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let token = self.tokens.access_token().await?;
        let body = InsertAllRequest {
            kind: "bigquery#tableDataInsertAllRequest",
            skip_invalid_rows: false,
            ignore_unknown_values: false,
            rows: rows.iter().map(|json| InsertAllRow { json }).collect(),
        };

        debug!("Appending {} rows to {}", rows.len(), self.table_id);

        let response =
            self.client.post(&self.insert_url).bearer_auth(token).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Status { status: status.as_u16(), body });
        }

        let result: InsertAllResponse = response.json().await?;
        if let Some(first) = result.insert_errors.first() {
            let detail = first
                .errors
                .first()
                .map(|e| {
                    format!(
                        "{}: {}",
                        e.reason.as_deref().unwrap_or("unknown"),
                        e.message.as_deref().unwrap_or("")
                    )
                })
                .unwrap_or_else(|| "no detail".to_string());
            return Err(SinkError::InsertErrors {
                failed_rows: result.insert_errors.len(),
                first_error: format!("row {}: {}", first.index, detail),
            });
        }

        Ok(rows.len())
    }

    fn table_id(&self) -> &str {
        &self.table_id
    }
}
