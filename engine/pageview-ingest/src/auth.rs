//! Access tokens for the BigQuery API
//!
//! Tokens are acquired per invocation and never cached across requests.

use reqwest::Client;
use serde::Deserialize;

use crate::error::TokenError;

/// Metadata server token response
#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
}

/// Where warehouse access tokens come from
#[derive(Debug, Clone)]
pub enum TokenSource {
    /// Fixed token, typically from `gcloud auth print-access-token` during development
    Static(String),

    /// GCE / Cloud Run metadata server for the attached service account
    MetadataServer { client: Client, url: String },
}

impl TokenSource {
    /// Pick the static token when configured, the metadata server otherwise
    pub fn from_config(access_token: Option<&str>, metadata_url: &str, client: Client) -> Self {
        match access_token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => Self::Static(token.to_string()),
            None => Self::MetadataServer { client, url: metadata_url.to_string() },
        }
    }

    /// Get a bearer token
    pub async fn access_token(&self) -> Result<String, TokenError> {
        match self {
            Self::Static(token) => Ok(token.clone()),
            Self::MetadataServer { client, url } => {
                let response = client.get(url).header("Metadata-Flavor", "Google").send().await?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(TokenError::Status { status: status.as_u16(), body });
                }

                let token: MetadataToken = response.json().await?;
                if token.access_token.is_empty() {
                    return Err(TokenError::Empty);
                }
                Ok(token.access_token)
            }
        }
    }
}
