//! The ingest handler: parse pages, fetch each one, append the rows, log one event.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use tracing::{debug, error, info, warn};

use crate::bigquery::RowSink;
use crate::config::{FailurePolicy, IngestConfig};
use crate::error::{IngestError, Result, StatsError};
use crate::models::{IngestResult, PageviewRecord};
use crate::wikimedia::StatsProvider;

/// Wikipedia titles are capped at 255 bytes
pub const MAX_TITLE_BYTES: usize = 255;

/// One invocation's input
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// Raw comma-separated `pages` parameter; `None` selects the configured defaults
    pub pages: Option<String>,

    /// Wikimedia project override
    pub project: Option<String>,

    pub request_id: String,
}

/// Counters reported in the invocation's log event
#[derive(Debug, Default)]
struct IngestProgress {
    project: Option<String>,
    query_day: Option<NaiveDate>,
    requested: usize,
    succeeded: usize,
    failed: Vec<String>,
    skipped: Vec<String>,
    written: usize,
}

/// Runs ingest invocations against a stats provider and a row sink
pub struct IngestService<P, S> {
    config: Arc<IngestConfig>,
    provider: P,
    sink: S,
}

impl<P, S> IngestService<P, S>
where
    P: StatsProvider,
    S: RowSink,
{
    pub fn new(config: Arc<IngestConfig>, provider: P, sink: S) -> Self {
        Self { config, provider, sink }
    }

    /// Ingest using the current UTC date
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestResult> {
        self.ingest_on(request, Utc::now().date_naive()).await
    }

    /// Ingest with `today` as the row date
    pub async fn ingest_on(&self, request: IngestRequest, today: NaiveDate) -> Result<IngestResult> {
        let mut progress = IngestProgress::default();

        let outcome = self.run(&request, today, &mut progress).await;
        self.emit_event(&request.request_id, &progress, outcome.as_ref());

        outcome
    }

    /// Log the summary event for a request turned away before `ingest` could run
    pub fn reject(&self, request_id: &str, err: IngestError) -> IngestError {
        self.emit_event(request_id, &IngestProgress::default(), Err(&err));
        err
    }

    /// Day the provider is asked about
    pub fn query_day(&self, today: NaiveDate) -> Result<NaiveDate> {
        let lookback = self.config.wikimedia.lookback_days;
        today.checked_sub_signed(Duration::days(i64::from(lookback))).ok_or_else(|| {
            IngestError::config(format!("wikimedia.lookback_days {lookback} is out of range"))
        })
    }

    async fn run(
        &self,
        request: &IngestRequest,
        today: NaiveDate,
        progress: &mut IngestProgress,
    ) -> Result<IngestResult> {
        let settings = &self.config.ingest;
        let pages =
            parse_pages(request.pages.as_deref(), &settings.default_pages, settings.max_pages)?;

        let project = match request.project.as_deref() {
            Some(project) => {
                validate_project(project)?;
                project.to_string()
            }
            None => self.config.wikimedia.project.clone(),
        };

        progress.project = Some(project.clone());
        progress.requested = pages.len();

        let query_day = self.query_day(today)?;
        progress.query_day = Some(query_day);

        let mut records = Vec::with_capacity(pages.len());
        let mut first_failure: Option<(String, StatsError)> = None;

        for article in &pages {
            match self.provider.fetch_daily_views(&project, article, query_day).await {
                Ok(Some(views)) => {
                    records.push(PageviewRecord::new(today, article.clone(), views)?);
                    progress.succeeded += 1;
                }
                Ok(None) => {
                    debug!("Skipping '{}': no data for {}", article, query_day);
                    progress.skipped.push(article.clone());
                }
                Err(source) => {
                    progress.failed.push(article.clone());
                    match settings.failure_policy {
                        FailurePolicy::AllOrNothing => {
                            return Err(IngestError::UpstreamFetch {
                                article: article.clone(),
                                source,
                            });
                        }
                        FailurePolicy::PartialSuccess => {
                            debug!("Fetch failed for '{}', continuing: {}", article, source);
                            first_failure.get_or_insert((article.clone(), source));
                        }
                    }
                }
            }
        }

        // Partial success still needs one page that did not fail.
        if progress.succeeded == 0 && progress.skipped.is_empty() {
            if let Some((article, source)) = first_failure {
                return Err(IngestError::UpstreamFetch { article, source });
            }
        }

        let written =
            if records.is_empty() { 0 } else { self.sink.append_rows(&records).await? };
        progress.written = written;

        Ok(IngestResult {
            written,
            pages,
            skipped: progress.skipped.clone(),
            failed: progress.failed.clone(),
            view_date: today,
            query_day,
            project,
            table: self.sink.table_id().to_string(),
            request_id: request.request_id.clone(),
        })
    }

    fn emit_event(
        &self,
        request_id: &str,
        progress: &IngestProgress,
        outcome: std::result::Result<&IngestResult, &IngestError>,
    ) {
        let project = progress.project.as_deref().unwrap_or("");
        let table = self.sink.table_id();
        let query_day = progress.query_day.map(|day| day.to_string()).unwrap_or_default();

        match outcome {
            Ok(_) => info!(
                event = "ingest_done",
                request_id,
                project,
                table,
                query_day = %query_day,
                pages_requested = progress.requested,
                pages_succeeded = progress.succeeded,
                pages_failed = progress.failed.len(),
                pages_skipped = progress.skipped.len(),
                rows_written = progress.written,
                failed_pages = ?progress.failed,
                "Pageview ingest completed"
            ),
            Err(e) if matches!(e, IngestError::InvalidInput(_)) => warn!(
                event = e.event_name(),
                request_id,
                table,
                pages_requested = progress.requested,
                pages_succeeded = 0usize,
                pages_failed = 0usize,
                rows_written = 0usize,
                error = %e,
                "Pageview ingest rejected"
            ),
            Err(e) => error!(
                event = e.event_name(),
                request_id,
                project,
                table,
                query_day = %query_day,
                pages_requested = progress.requested,
                pages_succeeded = progress.succeeded,
                pages_failed = progress.failed.len(),
                pages_skipped = progress.skipped.len(),
                rows_written = 0usize,
                failed_pages = ?progress.failed,
                error = %e,
                "Pageview ingest failed"
            ),
        }
    }
}

/// Split the `pages` parameter, falling back to `defaults` when it is absent
pub fn parse_pages(raw: Option<&str>, defaults: &[String], max_pages: usize) -> Result<Vec<String>> {
    let pages: Vec<String> = match raw {
        None => defaults.to_vec(),
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect(),
    };

    if pages.is_empty() {
        return Err(IngestError::invalid_input("No pages provided"));
    }

    if pages.len() > max_pages {
        return Err(IngestError::invalid_input(format!(
            "Too many pages: {} (max {})",
            pages.len(),
            max_pages
        )));
    }

    for page in &pages {
        validate_page_name(page)?;
    }

    Ok(pages)
}

/// Reject titles Wikipedia could never have
pub fn validate_page_name(page: &str) -> Result<()> {
    if page.trim().is_empty() {
        return Err(IngestError::invalid_input("Page name must not be empty"));
    }
    if page.len() > MAX_TITLE_BYTES {
        return Err(IngestError::invalid_input(format!(
            "Page name longer than {MAX_TITLE_BYTES} bytes"
        )));
    }
    if page.chars().any(char::is_control) {
        return Err(IngestError::invalid_input(format!(
            "Page name contains control characters: {page:?}"
        )));
    }
    Ok(())
}

/// Projects are host names such as `en.wikipedia.org`
pub fn validate_project(project: &str) -> Result<()> {
    let valid = !project.is_empty()
        && project.len() <= 100
        && project.contains('.')
        && project.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');

    if valid {
        Ok(())
    } else {
        Err(IngestError::invalid_input(format!("Invalid project: {project:?}")))
    }
}
