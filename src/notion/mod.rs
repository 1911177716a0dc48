//! Client plumbing for the document store API.
//!
//! Every remote call goes through one send path with one status
//! classification: HTTP 429 is the only retryable answer, everything
//! else fails fast with the response body captured. The backoff is
//! linear — `backoff_base × (attempt + 1)` — matching what the store's
//! rate limiter expects from well-behaved clients.

pub mod fields;
pub mod schema;
pub mod upsert;

use crate::config::NotionConfig;
use crate::error::{NotionError, NotionResult};
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use self::fields::FieldMap;

/// Retry decision for a non-2xx status. One decision point for every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Retryable,
    Fatal,
}

pub fn classify_status(status: StatusCode) -> Disposition {
    if status == StatusCode::TOO_MANY_REQUESTS {
        Disposition::Retryable
    } else {
        Disposition::Fatal
    }
}

pub(crate) fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * (attempt + 1)
}

pub struct NotionClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    version: String,
    max_attempts: u32,
    backoff_base: Duration,
}

impl NotionClient {
    pub fn new(config: &NotionConfig) -> NotionResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            version: config.api_version.clone(),
            max_attempts: config.max_attempts.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
        })
    }

    /// Send one API call, retrying only while the store says 429.
    async fn send_json(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> NotionResult<Value> {
        let url = format!("{}{}", self.base_url, path);

        for attempt in 0..self.max_attempts {
            let mut request = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(&self.token)
                .header("Notion-Version", &self.version);
            if let Some(body) = body {
                request = request.json(body);
            }

            debug!("{} {} (attempt {})", method, path, attempt + 1);
            let response = request.send().await?;
            let status = response.status();

            if status.is_success() {
                return Ok(response.json().await?);
            }

            match classify_status(status) {
                Disposition::Retryable => {
                    let wait = backoff_delay(self.backoff_base, attempt);
                    warn!(
                        "{} {}: rate limited (attempt {}/{}), sleeping {:?}",
                        method,
                        path,
                        attempt + 1,
                        self.max_attempts,
                        wait
                    );
                    sleep(wait).await;
                }
                Disposition::Fatal => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(NotionError::Rejected {
                        status: status.as_u16(),
                        body: truncate_body(&body),
                    });
                }
            }
        }

        Err(NotionError::RateLimited {
            attempts: self.max_attempts,
        })
    }

    /// `GET /v1/databases/{id}` — the collection's property types.
    pub async fn collection_schema(&self, collection_id: &str) -> NotionResult<Value> {
        self.send_json(Method::GET, &format!("/v1/databases/{collection_id}"), None)
            .await
    }

    /// Look up a record by its title property. First match wins.
    pub async fn query_page_id(
        &self,
        collection_id: &str,
        title_field: &str,
        key: &str,
    ) -> NotionResult<Option<String>> {
        let body = json!({
            "filter": {"property": title_field, "title": {"equals": key}}
        });
        let response = self
            .send_json(
                Method::POST,
                &format!("/v1/databases/{collection_id}/query"),
                Some(&body),
            )
            .await?;

        Ok(response["results"]
            .as_array()
            .and_then(|results| results.first())
            .and_then(|page| page["id"].as_str())
            .map(String::from))
    }

    /// Create a record in the collection. One remote call, all fields.
    pub async fn create_page(
        &self,
        collection_id: &str,
        fields: &FieldMap,
    ) -> NotionResult<String> {
        let body = json!({
            "parent": {"database_id": collection_id},
            "properties": fields,
        });
        let response = self.send_json(Method::POST, "/v1/pages", Some(&body)).await?;
        extract_page_id(&response)
    }

    /// Update an existing record in place.
    pub async fn update_page(&self, page_id: &str, fields: &FieldMap) -> NotionResult<String> {
        let body = json!({"properties": fields});
        let response = self
            .send_json(Method::PATCH, &format!("/v1/pages/{page_id}"), Some(&body))
            .await?;
        extract_page_id(&response)
    }

    /// `PATCH /v1/databases/{id}` — add properties to the collection.
    pub async fn add_columns(&self, collection_id: &str, properties: Value) -> NotionResult<()> {
        let body = json!({"properties": properties});
        self.send_json(
            Method::PATCH,
            &format!("/v1/databases/{collection_id}"),
            Some(&body),
        )
        .await?;
        Ok(())
    }
}

fn extract_page_id(response: &Value) -> NotionResult<String> {
    response["id"]
        .as_str()
        .map(String::from)
        .ok_or_else(|| NotionError::Decode("page response is missing `id`".to_string()))
}

fn truncate_body(body: &str) -> String {
    body.chars().take(300).collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
