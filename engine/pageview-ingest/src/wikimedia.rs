//! Wikimedia pageviews client
//!
//! One GET per article against the per-article daily endpoint. A 404 means the page
//! does not exist or has no data for the day and is reported as `Ok(None)`.

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::config::WikimediaConfig;
use crate::error::{IngestError, StatsError};
use crate::models::PageviewsResponse;

/// Source of daily pageview counts
#[async_trait::async_trait]
pub trait StatsProvider: Send + Sync {
    /// Views of `article` on `project` for `day`; `None` when the provider has no data
    async fn fetch_daily_views(
        &self,
        project: &str,
        article: &str,
        day: NaiveDate,
    ) -> Result<Option<u64>, StatsError>;
}

/// reqwest-backed Wikimedia REST client
#[derive(Debug, Clone)]
pub struct WikimediaClient {
    client: Client,
    base_url: String,
    access: String,
    agent: String,
}

impl WikimediaClient {
    /// Create a new client
    pub fn new(config: &WikimediaConfig) -> Result<Self, IngestError> {
        let user_agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|_| IngestError::config("wikimedia.user_agent is not a valid header value"))?;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, user_agent);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| IngestError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access: config.access.clone(),
            agent: config.agent.clone(),
        })
    }

    /// Per-article daily URL for a single day
    pub fn per_article_url(&self, project: &str, article: &str, day: NaiveDate) -> String {
        let title = article.trim().replace(' ', "_");
        let day = day.format("%Y%m%d");
        format!(
            "{}/metrics/pageviews/per-article/{}/{}/{}/{}/daily/{}/{}",
            self.base_url,
            project,
            self.access,
            self.agent,
            urlencoding::encode(&title),
            day,
            day
        )
    }
}

#[async_trait::async_trait]
impl StatsProvider for WikimediaClient {
    async fn fetch_daily_views(
        &self,
        project: &str,
        article: &str,
        day: NaiveDate,
    ) -> Result<Option<u64>, StatsError> {
        let url = self.per_article_url(project, article, day);
        debug!("Fetching pageviews from: {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            debug!("No pageview data for '{}' on {}", article, day);
            return Ok(None);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StatsError::Status { status: status.as_u16(), body });
        }

        let bytes = response.bytes().await?;
        let payload: PageviewsResponse = serde_json::from_slice(&bytes)?;
        Ok(Some(payload.total_views()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> WikimediaConfig {
        WikimediaConfig { base_url, timeout_secs: 5, ..Default::default() }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 15).unwrap()
    }

    #[test]
    fn test_url_encodes_title() {
        let client = WikimediaClient::new(&test_config("https://wikimedia.org/api/rest_v1/".into()))
            .unwrap();
        assert_eq!(
            client.per_article_url("en.wikipedia.org", "AC/DC", day()),
            "https://wikimedia.org/api/rest_v1/metrics/pageviews/per-article/en.wikipedia.org/all-access/user/AC%2FDC/daily/20261015/20261015"
        );
        assert!(client
            .per_article_url("sv.wikipedia.org", "Gamla stan", day())
            .contains("/user/Gamla_stan/daily/"));
    }

    #[tokio::test]
    async fn test_fetch_returns_views() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(
                "/metrics/pageviews/per-article/en.wikipedia.org/all-access/user/Stockholm/daily/20261015/20261015",
            ))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{
                    "project": "en.wikipedia",
                    "article": "Stockholm",
                    "granularity": "daily",
                    "timestamp": "2026101500",
                    "access": "all-access",
                    "agent": "user",
                    "views": 120
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = WikimediaClient::new(&test_config(server.uri())).unwrap();
        let views = client.fetch_daily_views("en.wikipedia.org", "Stockholm", day()).await.unwrap();
        assert_eq!(views, Some(120));
    }

    #[tokio::test]
    async fn test_fetch_sends_user_agent() {
        let server = MockServer::start().await;
        let config = test_config(server.uri());
        Mock::given(method("GET"))
            .and(header("user-agent", config.user_agent.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": []})))
            .expect(1)
            .mount(&server)
            .await;

        let client = WikimediaClient::new(&config).unwrap();
        let views = client.fetch_daily_views("en.wikipedia.org", "Sweden", day()).await.unwrap();
        assert_eq!(views, Some(0));
    }

    #[tokio::test]
    async fn test_not_found_is_no_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = WikimediaClient::new(&test_config(server.uri())).unwrap();
        let views = client.fetch_daily_views("en.wikipedia.org", "Nope", day()).await.unwrap();
        assert_eq!(views, None);
    }

    #[tokio::test]
    async fn test_server_error_is_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = WikimediaClient::new(&test_config(server.uri())).unwrap();
        let err = client.fetch_daily_views("en.wikipedia.org", "Sweden", day()).await.unwrap_err();
        assert_eq!(err, StatsError::Status { status: 503, body: "overloaded".to_string() });
    }

    #[tokio::test]
    async fn test_malformed_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"detail\": \"nope\"}"))
            .mount(&server)
            .await;

        let client = WikimediaClient::new(&test_config(server.uri())).unwrap();
        let err = client.fetch_daily_views("en.wikipedia.org", "Sweden", day()).await.unwrap_err();
        assert!(matches!(err, StatsError::MalformedPayload(_)));
    }
}
