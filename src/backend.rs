//! Remote backend client.
//!
//! Defines the [`Backend`] trait consumed by the forwarder and the search
//! coordinator, and [`HttpBackend`], its `reqwest` implementation.
//!
//! # Response shapes
//!
//! The search endpoint has answered in two shapes over time, with no
//! version marker:
//!
//! ```json
//! { "data": "a synthesized answer" }
//! { "results": [ { "url": "...", "content": "...", "relevanceScore": 0.9, "snippets": ["..."] } ] }
//! ```
//!
//! A non-empty `formattedResponse` next to `results` is the server's own
//! rendering of them and is used as the answer as-is.
//!
//! Ranked results may also carry the older nested record
//! (`{ timestamp, data: { scrapedTextData, url } }`). Every shape is
//! translated into a [`SearchAnswer`] by [`parse_search_response`] the
//! moment it is received; nothing downstream sees raw JSON.
//!
//! # Authorization
//!
//! When an `authToken` is stored, requests carry `Authorization: Bearer
//! <token>`. A `401` clears the stored token and surfaces as
//! [`BackendError::Unauthorized`]; later calls proceed unauthenticated.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::BackendConfig;
use crate::models::{timestamp, HistoryItem};
use crate::store::DurableStore;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend rejected the request as unauthorized")]
    Unauthorized,
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("backend refused the item: {0}")]
    Rejected(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("local store error: {0}")]
    Store(String),
}

impl From<anyhow::Error> for BackendError {
    fn from(err: anyhow::Error) -> Self {
        BackendError::Store(format!("{:#}", err))
    }
}

/// Canonical search answer, whatever shape the backend used.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchAnswer {
    PlainText(String),
    RankedResults(Vec<RankedResult>),
}

/// One ranked hit from the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedResult {
    pub url: String,
    pub title: Option<String>,
    pub content: String,
    pub relevance: Option<f64>,
    pub snippets: Vec<String>,
}

impl RankedResult {
    /// Title when present and non-blank, URL otherwise.
    pub fn label(&self) -> &str {
        match self.title.as_deref() {
            Some(t) if !t.trim().is_empty() => t,
            _ => &self.url,
        }
    }
}

/// The remote side of the coordinator.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Mirror one untruncated item.
    async fn ingest(&self, item: &HistoryItem) -> Result<(), BackendError>;

    /// Ask the backend to answer `query`.
    async fn search(&self, query: &str) -> Result<SearchAnswer, BackendError>;
}

// ============ Wire types ============

/// Ingestion body, in the record shape the backend stores.
#[derive(Debug, Serialize)]
struct IngestBody<'a> {
    #[serde(with = "timestamp")]
    timestamp: chrono::DateTime<chrono::Utc>,
    data: IngestData<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestData<'a> {
    user_id: &'a str,
    scraped_text_data: &'a str,
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct IngestResponse {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

fn default_success() -> bool {
    true
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchBody<'a> {
    user_id: &'a str,
    prompt: &'a str,
}

/// Translates any accepted search response into a [`SearchAnswer`].
pub fn parse_search_response(value: &Value) -> Result<SearchAnswer, BackendError> {
    match value {
        Value::String(s) => Ok(SearchAnswer::PlainText(s.clone())),
        Value::Object(map) => {
            if let Some(Value::String(text)) = map.get("formattedResponse") {
                if !text.trim().is_empty() {
                    return Ok(SearchAnswer::PlainText(text.clone()));
                }
            }
            if let Some(results) = map.get("results") {
                let list = results
                    .as_array()
                    .ok_or_else(|| BackendError::Decode("`results` is not an array".into()))?;
                let ranked = list
                    .iter()
                    .map(parse_ranked_result)
                    .collect::<Result<Vec<_>, _>>()?;
                return Ok(SearchAnswer::RankedResults(ranked));
            }
            match map.get("data") {
                Some(Value::String(s)) => Ok(SearchAnswer::PlainText(s.clone())),
                Some(Value::Null) | None => Ok(SearchAnswer::PlainText(String::new())),
                Some(other) => Err(BackendError::Decode(format!(
                    "`data` is not a string: {}",
                    other
                ))),
            }
        }
        other => Err(BackendError::Decode(format!(
            "expected an object or string, got {}",
            other
        ))),
    }
}

fn parse_ranked_result(value: &Value) -> Result<RankedResult, BackendError> {
    let obj = value
        .as_object()
        .ok_or_else(|| BackendError::Decode("result entry is not an object".into()))?;

    let str_field = |v: Option<&Value>| v.and_then(Value::as_str).map(str::to_string);

    // Nested record: { data: { url, scrapedTextData } }
    let nested = obj.get("data").and_then(Value::as_object);
    let url = str_field(obj.get("url"))
        .or_else(|| nested.and_then(|d| str_field(d.get("url"))))
        .ok_or_else(|| BackendError::Decode("result entry has no url".into()))?;
    let content = str_field(obj.get("content"))
        .or_else(|| nested.and_then(|d| str_field(d.get("scrapedTextData"))))
        .unwrap_or_default();
    let title = str_field(obj.get("title"))
        .or_else(|| nested.and_then(|d| str_field(d.get("title"))));

    let relevance = obj
        .get("relevanceScore")
        .or_else(|| obj.get("score"))
        .and_then(Value::as_f64);
    let snippets: Vec<String> = obj
        .get("snippets")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(RankedResult {
        url,
        title,
        content,
        relevance,
        snippets,
    })
}

// ============ HTTP implementation ============

/// `reqwest`-backed [`Backend`].
///
/// The base URL is resolved per call: `settings.serverUrl` when set,
/// `backend.base_url` from the config otherwise.
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    config: BackendConfig,
    store: DurableStore,
}

impl HttpBackend {
    pub fn new(config: BackendConfig, store: DurableStore) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            config,
            store,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.config.user_id
    }

    pub(crate) fn store(&self) -> &DurableStore {
        &self.store
    }

    async fn base_url(&self) -> Result<String, BackendError> {
        let settings = self.store.settings().await?;
        let base = settings
            .server_url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| self.config.base_url.clone());
        Ok(base.trim_end_matches('/').to_string())
    }

    /// POSTs `body` as JSON to `path` and returns the decoded JSON reply.
    pub(crate) async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Value, BackendError> {
        let url = format!("{}{}", self.base_url().await?, path);
        let mut request = self.client.post(&url).json(body);
        if let Some(token) = self.store.auth_token().await? {
            request = request.bearer_auth(token);
        }

        debug!(url = %url, "backend request");
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            warn!(url = %url, "backend returned 401; clearing stored auth token");
            self.store.clear_auth_token().await?;
            return Err(BackendError::Unauthorized);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn ingest(&self, item: &HistoryItem) -> Result<(), BackendError> {
        let body = IngestBody {
            timestamp: item.timestamp,
            data: IngestData {
                user_id: &self.config.user_id,
                scraped_text_data: &item.content,
                url: &item.url,
                title: item.title.as_deref(),
            },
        };
        let reply = self.post_json(&self.config.ingest_path, &body).await?;
        if reply.is_null() {
            return Ok(());
        }

        let parsed: IngestResponse =
            serde_json::from_value(reply).map_err(|e| BackendError::Decode(e.to_string()))?;
        if parsed.success {
            Ok(())
        } else {
            Err(BackendError::Rejected(
                parsed.message.unwrap_or_else(|| "no reason given".to_string()),
            ))
        }
    }

    async fn search(&self, query: &str) -> Result<SearchAnswer, BackendError> {
        let body = SearchBody {
            user_id: &self.config.user_id,
            prompt: query,
        };
        let reply = self.post_json(&self.config.search_path, &body).await?;
        parse_search_response(&reply)
    }
}
