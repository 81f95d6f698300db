//! REST API endpoints
//!
//! `GET /health` is a liveness probe with no side effects. `GET /ingest` runs one
//! ingest invocation. Caller identity is enforced by the hosting platform.

use std::convert::Infallible;
use std::sync::Arc;

use warp::http::{HeaderMap, StatusCode};
use warp::reply::Response;
use warp::{Filter, Reply};

use crate::bigquery::RowSink;
use crate::error::IngestError;
use crate::ingest::{IngestRequest, IngestService};
use crate::models::{ErrorDetail, ErrorResponse, HealthResponse};
use crate::wikimedia::StatsProvider;

/// Header Cloud Run sets on incoming requests: `TRACE_ID/SPAN_ID;o=OPTIONS`
pub const TRACE_CONTEXT_HEADER: &str = "x-cloud-trace-context";

/// Response header carrying the request identifier
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// `/ingest` query parameters
#[derive(Debug, Default, PartialEq)]
pub struct IngestParams {
    /// Comma-separated page titles
    pub pages: Option<String>,

    /// Wikimedia project, e.g. `sv.wikipedia.org`
    pub project: Option<String>,
}

impl IngestParams {
    /// Collect the known parameters from decoded query pairs; unknown keys are ignored
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Result<Self, IngestError> {
        let mut params = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "pages" => &mut params.pages,
                "project" => &mut params.project,
                _ => continue,
            };
            if slot.replace(value).is_some() {
                return Err(IngestError::invalid_input(format!(
                    "Query parameter '{key}' given more than once"
                )));
            }
        }
        Ok(params)
    }
}

/// Request id from the trace header, or a fresh UUID
pub fn request_id_from_trace_header(header: Option<&str>) -> String {
    header
        .and_then(|value| value.split('/').next())
        .map(str::trim)
        .filter(|trace_id| !trace_id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Liveness probe
pub async fn health() -> Result<impl Reply, Infallible> {
    Ok(warp::reply::json(&HealthResponse::ok()))
}

/// Run one ingest invocation
pub async fn ingest<P, S>(
    query: Vec<(String, String)>,
    headers: HeaderMap,
    service: Arc<IngestService<P, S>>,
) -> Result<Response, Infallible>
where
    P: StatsProvider,
    S: RowSink,
{
    // A trace header that is not valid UTF-8 is treated as absent
    let trace_context = headers.get(TRACE_CONTEXT_HEADER).and_then(|v| v.to_str().ok());
    let request_id = request_id_from_trace_header(trace_context);

    let outcome = match IngestParams::from_pairs(query) {
        Ok(params) => {
            let request = IngestRequest {
                pages: params.pages,
                project: params.project,
                request_id: request_id.clone(),
            };
            service.ingest(request).await
        }
        Err(e) => Err(service.reject(&request_id, e)),
    };

    let response = match outcome {
        Ok(result) => warp::reply::with_status(warp::reply::json(&result), StatusCode::OK)
            .into_response(),
        Err(e) => error_reply(&e),
    };

    Ok(warp::reply::with_header(response, REQUEST_ID_HEADER, request_id).into_response())
}

/// JSON error body with the matching status code
pub fn error_reply(err: &IngestError) -> Response {
    let details = match err {
        IngestError::UpstreamFetch { article, .. } => Some(serde_json::json!({ "article": article })),
        _ => None,
    };

    let body = ErrorResponse {
        error: ErrorDetail { code: err.code().to_string(), message: err.to_string(), details },
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    warp::reply::with_status(warp::reply::json(&body), err.status_code()).into_response()
}

pub fn create_routes<P, S>(
    service: Arc<IngestService<P, S>>,
) -> impl Filter<Extract = impl Reply, Error = warp::Rejection> + Clone
where
    P: StatsProvider + 'static,
    S: RowSink + 'static,
{
    let service_filter = warp::any().map(move || service.clone());

    // Health check endpoint
    let health = warp::path("health").and(warp::path::end()).and(warp::get()).and_then(health);

    // Ingest endpoint
    let ingest = warp::path("ingest")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<Vec<(String, String)>>())
        .and(warp::header::headers_cloned())
        .and(service_filter)
        .and_then(ingest::<P, S>);

    health.or(ingest).with(warp::trace::request())
}
