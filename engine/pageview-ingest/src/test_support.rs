//! In-memory collaborators for tests

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use crate::bigquery::RowSink;
use crate::config::{FailurePolicy, IngestConfig};
use crate::error::{SinkError, StatsError};
use crate::ingest::{IngestRequest, IngestService};
use crate::models::PageviewRecord;
use crate::wikimedia::StatsProvider;

pub const TEST_TABLE: &str = "gcp-poc.raw.wikipedia_pageviews";

/// Provider answering from a fixed table; unknown pages are a 404
#[derive(Clone, Default)]
pub struct FakeProvider {
    responses: Arc<HashMap<String, Result<u64, StatsError>>>,
    calls: Arc<Mutex<Vec<(String, String, NaiveDate)>>>,
}

impl FakeProvider {
    pub fn new(responses: Vec<(&str, Result<u64, StatsError>)>) -> Self {
        let responses = responses.into_iter().map(|(page, r)| (page.to_string(), r)).collect();
        Self { responses: Arc::new(responses), calls: Arc::default() }
    }

    /// `(project, article, day)` per call, in call order
    pub fn calls(&self) -> Vec<(String, String, NaiveDate)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl StatsProvider for FakeProvider {
    async fn fetch_daily_views(
        &self,
        project: &str,
        article: &str,
        day: NaiveDate,
    ) -> Result<Option<u64>, StatsError> {
        self.calls.lock().unwrap().push((project.to_string(), article.to_string(), day));
        match self.responses.get(article) {
            Some(Ok(views)) => Ok(Some(*views)),
            Some(Err(e)) => Err(e.clone()),
            None => Ok(None),
        }
    }
}

/// Sink that keeps every batch it was handed
#[derive(Clone, Default)]
pub struct MemorySink {
    batches: Arc<Mutex<Vec<Vec<PageviewRecord>>>>,
    fail_with: Option<String>,
}

impl MemorySink {
    pub fn failing(message: &str) -> Self {
        Self { batches: Arc::default(), fail_with: Some(message.to_string()) }
    }

    pub fn batches(&self) -> Vec<Vec<PageviewRecord>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn rows(&self) -> Vec<PageviewRecord> {
        self.batches().into_iter().flatten().collect()
    }
}

#[async_trait::async_trait]
impl RowSink for MemorySink {
    async fn append_rows(&self, rows: &[PageviewRecord]) -> Result<usize, SinkError> {
        if let Some(message) = &self.fail_with {
            return Err(SinkError::Rejected(message.clone()));
        }
        self.batches.lock().unwrap().push(rows.to_vec());
        Ok(rows.len())
    }

    fn table_id(&self) -> &str {
        TEST_TABLE
    }
}

pub fn test_config(policy: FailurePolicy) -> Arc<IngestConfig> {
    let mut config = IngestConfig::default();
    config.bigquery.project_id = "gcp-poc".to_string();
    config.ingest.failure_policy = policy;
    Arc::new(config)
}

pub fn service(
    policy: FailurePolicy,
    provider: FakeProvider,
    sink: MemorySink,
) -> IngestService<FakeProvider, MemorySink> {
    IngestService::new(test_config(policy), provider, sink)
}

pub fn request(pages: Option<&str>) -> IngestRequest {
    IngestRequest {
        pages: pages.map(str::to_string),
        project: None,
        request_id: "req-1".to_string(),
    }
}

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
}

/// Fields of one captured event, rendered as strings
pub type EventFields = BTreeMap<String, String>;

/// Layer recording every event emitted while its guard is installed
#[derive(Clone, Default)]
pub struct CapturedEvents {
    events: Arc<Mutex<Vec<EventFields>>>,
}

impl CapturedEvents {
    /// Route this thread's events here until the guard drops
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
    }

    /// Summary events, i.e. the ones carrying an `event` field
    pub fn summaries(&self) -> Vec<EventFields> {
        self.events.lock().unwrap().iter().filter(|e| e.contains_key("event")).cloned().collect()
    }
}

struct FieldRecorder<'a>(&'a mut EventFields);

impl Visit for FieldRecorder<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}

impl<S: Subscriber> Layer<S> for CapturedEvents {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = EventFields::new();
        event.record(&mut FieldRecorder(&mut fields));
        self.events.lock().unwrap().push(fields);
    }
}
