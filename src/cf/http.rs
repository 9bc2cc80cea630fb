//! HTTP utilities for Cloud Foundry REST API calls

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::error::{Error, Result};

/// Default timeout attached to every request; the upstream APIs assume none.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips non-printable characters
pub(crate) fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = body
            .char_indices()
            .take_while(|(i, _)| *i < MAX_LOG_BODY_LENGTH)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!(
            "{}... [truncated, {} bytes total]",
            &body[..cut],
            body.len()
        )
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Build the shared HTTP client with the crate user agent and timeout.
pub fn build_client() -> Result<Client> {
    let client = Client::builder()
        .user_agent(concat!("cfvault/", env!("CARGO_PKG_VERSION")))
        .timeout(REQUEST_TIMEOUT)
        .build()?;
    Ok(client)
}

/// HTTP client wrapper for authorized CF API calls
#[derive(Clone)]
pub struct CfHttpClient {
    client: Client,
}

impl CfHttpClient {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_client()?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Make an authorized GET request
    pub async fn get(&self, url: &str, token: &str, query: &[(String, String)]) -> Result<Value> {
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        read_json(response).await
    }

    /// Make an authorized POST request with a JSON body
    pub async fn post(
        &self,
        url: &str,
        token: &str,
        query: &[(String, String)],
        body: &Value,
    ) -> Result<Value> {
        tracing::debug!("POST {}", url);

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .query(query)
            .json(body)
            .send()
            .await?;

        read_json(response).await
    }

    /// Make an authorized DELETE request
    pub async fn delete(
        &self,
        url: &str,
        token: &str,
        query: &[(String, String)],
    ) -> Result<Value> {
        tracing::debug!("DELETE {}", url);

        let response = self
            .client
            .delete(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        read_json(response).await
    }
}

/// Decode a response, mapping non-success statuses to [`Error::Resource`].
async fn read_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        // Only log sanitized/truncated error body to avoid leaking sensitive data
        tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
        return Err(Error::Resource { status, body });
    }

    // Deletes and some creates return an empty body
    if body.is_empty() {
        return Ok(Value::Null);
    }

    Ok(serde_json::from_str(&body)?)
}
