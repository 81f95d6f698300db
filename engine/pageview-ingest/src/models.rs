use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};

/// One row of the pageviews table: `(view_date DATE, article STRING, views INT64)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageviewRecord {
    pub view_date: NaiveDate,
    pub article: String,
    pub views: u64,
}

impl PageviewRecord {
    /// Build a record, rejecting an empty article
    pub fn new(view_date: NaiveDate, article: impl Into<String>, views: u64) -> Result<Self> {
        let article = article.into();
        if article.trim().is_empty() {
            return Err(IngestError::invalid_input("article must not be empty"));
        }
        Ok(Self { view_date, article, views })
    }
}

/// Wikimedia per-article pageviews response
#[derive(Debug, Deserialize)]
pub struct PageviewsResponse {
    pub items: Vec<PageviewItem>,
}

/// Single data point of a per-article response
#[derive(Debug, Deserialize)]
pub struct PageviewItem {
    #[serde(default)]
    pub project: Option<String>,

    #[serde(default)]
    pub article: Option<String>,

    /// `YYYYMMDDHH`
    pub timestamp: String,

    pub views: u64,
}

impl PageviewsResponse {
    /// Total views across all returned items
    pub fn total_views(&self) -> u64 {
        self.items.iter().fold(0u64, |acc, item| acc.saturating_add(item.views))
    }
}

/// Successful `/ingest` response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestResult {
    /// Rows appended to the warehouse
    pub written: usize,

    /// Pages requested, in request order
    pub pages: Vec<String>,

    /// Pages for which the provider had no data (404)
    pub skipped: Vec<String>,

    /// Pages whose fetch failed (partial-success policy only)
    pub failed: Vec<String>,

    /// Date stamped on every written row
    pub view_date: NaiveDate,

    /// Day the provider was queried for
    pub query_day: NaiveDate,

    pub project: String,
    pub table: String,
    pub request_id: String,
}

/// Liveness payload
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self { status: "ok".to_string() }
    }
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
    pub timestamp: String,
}

/// Error detail
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}
