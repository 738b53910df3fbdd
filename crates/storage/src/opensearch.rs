//! [`DocumentStore`] backed by the OpenSearch REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use tracing::{debug, info, warn};

use detect_core::config::OpenSearchConfig;
use detect_core::{RefreshPolicy, WriteAck, WriteStatus};

use crate::{CreateIndexAck, DocumentStore, StoreError, StoredDocument, WriteCondition};

/// OpenSearch client speaking the index and document REST endpoints.
#[derive(Debug, Clone)]
pub struct OpenSearchStore {
    base_url: Url,
    username: Option<String>,
    password: Option<String>,
    /// Shared HTTP client (connection pooling).
    client: reqwest::Client,
}

impl OpenSearchStore {
    pub fn new(config: &OpenSearchConfig) -> Result<Self, StoreError> {
        let base_url = Url::parse(&config.base_url())
            .map_err(|e| StoreError::Other(format!("invalid OpenSearch url: {e}")))?;
        info!(url = %base_url, "OpenSearch store configured");
        Ok(Self {
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
            client: reqwest::Client::new(),
        })
    }

    /// Build `{base}/{segments...}` with each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Other(format!("base url cannot have a path: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let request = self.client.request(method, url);
        match &self.username {
            Some(user) => request.basic_auth(user, self.password.as_deref()),
            None => request,
        }
    }

    /// `PUT /{index}/_doc/{id}` with extra query parameters.
    async fn put_document(
        &self,
        index: &str,
        id: &str,
        body: &serde_json::Value,
        timeout: Duration,
        refresh: RefreshPolicy,
        params: &[(&str, String)],
    ) -> Result<WriteAck, StoreError> {
        let mut url = self.url(&[index, "_doc", id])?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("refresh", refresh.as_param())
                .append_pair("timeout", &format!("{}s", timeout.as_secs().max(1)));
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }

        let response = self
            .request(Method::PUT, url)
            .timeout(timeout)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::CONFLICT {
            return Err(StoreError::VersionConflict {
                index: index.to_string(),
                id: id.to_string(),
            });
        }
        let payload = read_payload(index, response).await?;

        if !status.is_success() {
            return Err(classify_error(index, status.as_u16(), &payload));
        }
        parse_write_response(&payload)
    }
}

#[async_trait]
impl DocumentStore for OpenSearchStore {
    async fn index_exists(&self, index: &str) -> Result<bool, StoreError> {
        let url = self.url(&[index])?;
        let response = self.request(Method::HEAD, url).send().await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(StoreError::Rejected {
                status: status.as_u16(),
                reason: format!("index exists check for '{index}'"),
            }),
        }
    }

    async fn create_index(
        &self,
        index: &str,
        schema: &serde_json::Value,
    ) -> Result<CreateIndexAck, StoreError> {
        let url = self.url(&[index])?;
        let response = self.request(Method::PUT, url).json(schema).send().await?;
        let status = response.status();
        let body = read_payload(index, response).await?;

        if !status.is_success() {
            return Err(classify_error(index, status.as_u16(), &body));
        }

        let acknowledged = body
            .get("acknowledged")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        debug!(index, acknowledged, "create index response");
        Ok(CreateIndexAck { acknowledged })
    }

    async fn write_document(
        &self,
        index: &str,
        id: &str,
        body: &serde_json::Value,
        timeout: Duration,
        refresh: RefreshPolicy,
    ) -> Result<WriteAck, StoreError> {
        self.put_document(index, id, body, timeout, refresh, &[]).await
    }

    async fn write_document_if(
        &self,
        index: &str,
        id: &str,
        body: &serde_json::Value,
        condition: WriteCondition,
        timeout: Duration,
        refresh: RefreshPolicy,
    ) -> Result<WriteAck, StoreError> {
        let params = condition_params(condition);
        self.put_document(index, id, body, timeout, refresh, &params).await
    }

    async fn get_document(
        &self,
        index: &str,
        id: &str,
    ) -> Result<Option<StoredDocument>, StoreError> {
        let url = self.url(&[index, "_doc", id])?;
        let response = self.request(Method::GET, url).send().await?;
        let status = response.status();
        let payload = read_payload(index, response).await?;

        if status == StatusCode::NOT_FOUND {
            // Missing index and missing document both come back as 404.
            if payload.get("found").and_then(|v| v.as_bool()) == Some(false) {
                return Ok(None);
            }
            return Err(classify_error(index, status.as_u16(), &payload));
        }
        if !status.is_success() {
            return Err(classify_error(index, status.as_u16(), &payload));
        }
        parse_get_response(&payload)
    }

    async fn delete_document(
        &self,
        index: &str,
        id: &str,
        refresh: RefreshPolicy,
    ) -> Result<Option<WriteAck>, StoreError> {
        let mut url = self.url(&[index, "_doc", id])?;
        url.query_pairs_mut().append_pair("refresh", refresh.as_param());

        let response = self.request(Method::DELETE, url).send().await?;
        let status = response.status();
        let payload = read_payload(index, response).await?;

        if status == StatusCode::NOT_FOUND
            && payload.get("result").and_then(|v| v.as_str()) == Some("not_found")
        {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(classify_error(index, status.as_u16(), &payload));
        }
        parse_write_response(&payload).map(Some)
    }
}

// ── Response helpers ────────────────────────────────────────────────

/// Query parameters enforcing `condition` on a document write.
pub(crate) fn condition_params(condition: WriteCondition) -> Vec<(&'static str, String)> {
    match condition {
        WriteCondition::Absent => vec![("op_type", "create".to_string())],
        WriteCondition::Unchanged { seq_no, primary_term } => vec![
            ("if_seq_no", seq_no.to_string()),
            ("if_primary_term", primary_term.to_string()),
        ],
    }
}

async fn read_payload(
    index: &str,
    response: reqwest::Response,
) -> Result<serde_json::Value, StoreError> {
    let status = response.status().as_u16();
    let text = response.text().await?;
    decode_payload(index, status, &text)
}

/// Decode a response body. Error statuses with a non-JSON body (a proxy page,
/// say) become [`StoreError::Rejected`] carrying the raw text.
pub(crate) fn decode_payload(
    index: &str,
    status: u16,
    text: &str,
) -> Result<serde_json::Value, StoreError> {
    match serde_json::from_str(text) {
        Ok(payload) => Ok(payload),
        Err(_) if !(200..300).contains(&status) => {
            let reason = text.trim().chars().take(512).collect::<String>();
            warn!(index, status, reason = %reason, "OpenSearch returned a non-JSON error body");
            Err(StoreError::Rejected { status, reason })
        }
        Err(e) => Err(StoreError::UnexpectedResponse(format!(
            "response body is not JSON ({e})"
        ))),
    }
}

/// Map an OpenSearch error body onto a [`StoreError`].
pub(crate) fn classify_error(index: &str, status: u16, body: &serde_json::Value) -> StoreError {
    let error = body.get("error");
    let kind = error
        .and_then(|e| e.get("type"))
        .and_then(|t| t.as_str())
        .unwrap_or_default();

    match kind {
        "resource_already_exists_exception" => StoreError::IndexAlreadyExists(index.to_string()),
        "index_not_found_exception" => StoreError::IndexNotFound(index.to_string()),
        _ => {
            let reason = error
                .and_then(|e| e.get("reason"))
                .and_then(|r| r.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| body.to_string());
            warn!(index, status, reason = %reason, "OpenSearch rejected request");
            StoreError::Rejected { status, reason }
        }
    }
}

/// Parse the `_id`/`_version`/`result` triple from an index or delete response.
pub(crate) fn parse_write_response(payload: &serde_json::Value) -> Result<WriteAck, StoreError> {
    let id = payload
        .get("_id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| StoreError::UnexpectedResponse(format!("missing _id in {payload}")))?;
    let version = payload
        .get("_version")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| StoreError::UnexpectedResponse(format!("missing _version in {payload}")))?;
    let status = match payload.get("result").and_then(|v| v.as_str()) {
        Some("created") => WriteStatus::Created,
        Some("updated") | Some("noop") => WriteStatus::Updated,
        Some("deleted") => WriteStatus::Deleted,
        other => {
            return Err(StoreError::UnexpectedResponse(format!(
                "unknown write result {other:?}"
            )))
        }
    };
    Ok(WriteAck {
        id: id.to_string(),
        version,
        status,
    })
}

pub(crate) fn parse_get_response(
    payload: &serde_json::Value,
) -> Result<Option<StoredDocument>, StoreError> {
    if payload.get("found").and_then(|v| v.as_bool()) != Some(true) {
        return Ok(None);
    }
    let id = payload
        .get("_id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| StoreError::UnexpectedResponse(format!("missing _id in {payload}")))?;
    Ok(Some(StoredDocument {
        id: id.to_string(),
        version: payload.get("_version").and_then(|v| v.as_i64()).unwrap_or(1),
        seq_no: payload.get("_seq_no").and_then(|v| v.as_i64()).unwrap_or_default(),
        primary_term: payload
            .get("_primary_term")
            .and_then(|v| v.as_i64())
            .unwrap_or_default(),
        source: payload.get("_source").cloned().unwrap_or(serde_json::Value::Null),
    }))
}
