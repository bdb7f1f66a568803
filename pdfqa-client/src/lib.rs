//! HTTP client for the PDF Q&A backend.
//!
//! Implements [`LocationBackend`] for the highlight locator and exposes the
//! document, upload and chat endpoints the rest of the application needs.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

use pdfqa_core::{
    BackendError, ChatAnswer, DocumentRecord, HighlightRequest, LocationBackend, MatchLocation,
    SearchQuery,
};

mod wire;

pub use wire::{AvailableDocument, ProcessingStatus, RetryReceipt, SearchHit, UploadReceipt};
use wire::{
    ApiStatus, AvailableDocumentsPayload, ChatPayload, ChatRequestBody, DocumentPayload,
    HighlightPayload, NavigationPayload, ProcessingStatusPayload, RetryPayload, SearchPayload,
    UploadPayload,
};

const USER_AGENT: &str = concat!("pdfqa/", env!("CARGO_PKG_VERSION"));

/// Configuration for [`ApiClient`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL every endpoint path is appended to.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Whole-request timeout in seconds. Highlight rendering downloads and
    /// re-uploads the PDF server side, so keep this generous.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Largest file `upload` will send.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000/api".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_upload_bytes() -> u64 {
    50 * 1024 * 1024
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("API error: {0}")]
    Api(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("document id mismatch: requested {requested}, backend answered for {returned}")]
    DocumentMismatch { requested: String, returned: String },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ClientError> for BackendError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Http { status, message } => BackendError::http(status, message),
            ClientError::Transport(inner) => {
                let message = error_chain(&inner);
                match inner.status() {
                    Some(status) => BackendError::http(status.as_u16(), message),
                    None => BackendError::transport(message),
                }
            }
            other => BackendError::transport(other.to_string()),
        }
    }
}

/// Client for the Q&A backend REST API.
#[derive(Clone)]
pub struct ApiClient {
    config: ClientConfig,
    base: Url,
    http: Client,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let base = Url::parse(&config.base_url).map_err(|err| ClientError::InvalidBaseUrl {
            url: config.base_url.clone(),
            reason: err.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidBaseUrl {
                url: config.base_url.clone(),
                reason: "URL cannot carry a path".to_string(),
            });
        }
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .build()?;
        Ok(Self { config, base, http })
    }

    /// Send `request` and decode its JSON body. A timeout is reported with
    /// the configured limit rather than as a bare transport failure.
    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let outcome = match request.send().await {
            Ok(response) => decode(response).await,
            Err(err) => Err(ClientError::Transport(err)),
        };
        outcome.map_err(|err| match err {
            ClientError::Transport(inner) if inner.is_timeout() => {
                warn!(secs = self.config.timeout_secs, "backend request timed out");
                ClientError::Timeout {
                    secs: self.config.timeout_secs,
                }
            }
            other => other,
        })
    }

    /// Base URL plus `segments`, each percent-encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    #[instrument(skip(self))]
    pub async fn page_navigation(
        &self,
        document_id: &str,
        search_text: &str,
    ) -> Result<Vec<MatchLocation>, ClientError> {
        let mut url = self.endpoint(&["page-navigation", document_id]);
        url.query_pairs_mut().append_pair("search_text", search_text);

        let payload: NavigationPayload = self.fetch(self.http.get(url)).await?;
        ensure_success(payload.status, payload.message)?;

        if let Some(returned) = payload.document_id {
            if returned != document_id {
                return Err(ClientError::DocumentMismatch {
                    requested: document_id.to_string(),
                    returned,
                });
            }
        }
        if payload.locations.iter().any(|l| l.page_number == 0) {
            return Err(ClientError::Parse("location with page number 0".to_string()));
        }
        debug!(matches = payload.locations.len(), "page navigation answered");
        Ok(payload.locations)
    }

    #[instrument(skip(self), fields(document_id = %request.document_id, page = request.page_number))]
    pub async fn highlight_pdf(&self, request: &HighlightRequest) -> Result<Url, ClientError> {
        let url = self.endpoint(&["highlight"]);
        let payload: HighlightPayload =
            self.fetch(self.http.post(url).json(request)).await?;
        ensure_success(payload.status, payload.message)?;

        let raw = payload
            .highlighted_pdf_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ClientError::Api("backend returned no highlight URL".to_string()))?;
        Url::parse(&raw).map_err(|err| ClientError::Parse(format!("highlight URL {raw:?}: {err}")))
    }

    #[instrument(skip(self))]
    pub async fn document(&self, document_id: &str) -> Result<DocumentRecord, ClientError> {
        let url = self.endpoint(&["documents", document_id]);
        let payload: DocumentPayload = self.fetch(self.http.get(url)).await?;
        ensure_success(payload.status, payload.message)?;

        let record = payload
            .data
            .ok_or_else(|| ClientError::Parse("document response without data".to_string()))?;
        if record.id != document_id {
            return Err(ClientError::DocumentMismatch {
                requested: document_id.to_string(),
                returned: record.id,
            });
        }
        Ok(record)
    }

    /// Ask a question. `document_ids` restricts retrieval when non-empty.
    #[instrument(skip(self, message))]
    pub async fn chat(
        &self,
        message: &str,
        max_results: u32,
        document_ids: &[String],
    ) -> Result<ChatAnswer, ClientError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ClientError::InvalidRequest("message is empty".to_string()));
        }
        let body = ChatRequestBody {
            message,
            max_results,
            document_ids: (!document_ids.is_empty()).then_some(document_ids),
        };
        let url = self.endpoint(&["chat"]);
        let payload: ChatPayload = self.fetch(self.http.post(url).json(&body)).await?;
        ensure_success(payload.status, payload.message)?;

        let answer = ChatAnswer {
            answer: payload.answer.unwrap_or_default(),
            sources: payload.sources,
            document_ids: payload.document_ids,
            processing_time: payload.processing_time,
        };
        info!(
            sources = answer.sources.len(),
            seconds = answer.processing_time,
            "chat answered"
        );
        Ok(answer)
    }

    #[instrument(skip(self))]
    pub async fn upload(
        &self,
        path: &Path,
        auto_process: bool,
    ) -> Result<UploadReceipt, ClientError> {
        let filename = upload_filename(path)?;
        let bytes = tokio::fs::read(path).await?;
        check_upload_size(bytes.len() as u64, self.config.max_upload_bytes)?;

        let part = Part::bytes(bytes)
            .file_name(filename)
            .mime_str("application/pdf")?;
        let form = Form::new()
            .part("file", part)
            .text("auto_process", auto_process.to_string());

        let url = self.endpoint(&["upload"]);
        let payload: UploadPayload =
            self.fetch(self.http.post(url).multipart(form)).await?;
        ensure_success(payload.status, Some(payload.receipt.message.clone()))?;
        info!(document_id = %payload.receipt.document_id, "upload accepted");
        Ok(payload.receipt)
    }

    #[instrument(skip(self))]
    pub async fn upload_status(&self, document_id: &str) -> Result<ProcessingStatus, ClientError> {
        let url = self.endpoint(&["upload", "status", document_id]);
        let payload: ProcessingStatusPayload = self.fetch(self.http.get(url)).await?;
        ensure_success(payload.status, None)?;
        Ok(payload.processing)
    }

    #[instrument(skip(self))]
    pub async fn available_documents(&self) -> Result<Vec<AvailableDocument>, ClientError> {
        let url = self.endpoint(&["chat", "documents"]);
        let payload: AvailableDocumentsPayload = self.fetch(self.http.get(url)).await?;
        ensure_success(payload.status, payload.message)?;
        Ok(payload.documents)
    }

    /// Retrieval without answer generation. `document_ids` restricts the
    /// search when non-empty and travels as the JSON body.
    #[instrument(skip(self, query))]
    pub async fn search_chunks(
        &self,
        query: &str,
        limit: u32,
        document_ids: &[String],
    ) -> Result<Vec<SearchHit>, ClientError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ClientError::InvalidRequest("search query is empty".to_string()));
        }
        let mut url = self.endpoint(&["chat", "search"]);
        url.query_pairs_mut()
            .append_pair("query", query)
            .append_pair("limit", &limit.to_string());

        let mut request = self.http.post(url);
        if !document_ids.is_empty() {
            request = request.json(document_ids);
        }
        let payload: SearchPayload = self.fetch(request).await?;
        ensure_success(payload.status, payload.message)?;
        debug!(hits = payload.results.len(), "chunk search answered");
        Ok(payload.results)
    }

    /// Restart processing of a document whose vectorization failed.
    #[instrument(skip(self))]
    pub async fn retry_processing(&self, document_id: &str) -> Result<RetryReceipt, ClientError> {
        let url = self.endpoint(&["upload", "retry", document_id]);
        let payload: RetryPayload = self.fetch(self.http.post(url)).await?;
        ensure_success(payload.status, Some(payload.receipt.message.clone()))?;
        if payload.receipt.document_id != document_id {
            return Err(ClientError::DocumentMismatch {
                requested: document_id.to_string(),
                returned: payload.receipt.document_id,
            });
        }
        info!(document_id, "processing restarted");
        Ok(payload.receipt)
    }
}

#[async_trait]
impl LocationBackend for ApiClient {
    async fn page_locations(
        &self,
        document_id: &str,
        query: &SearchQuery,
    ) -> Result<Vec<MatchLocation>, BackendError> {
        self.page_navigation(document_id, query.as_str())
            .await
            .map_err(BackendError::from)
    }

    async fn highlight(&self, request: &HighlightRequest) -> Result<Url, BackendError> {
        self.highlight_pdf(request).await.map_err(BackendError::from)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ClientError::Http {
            status: status.as_u16(),
            message: error_detail(&body, status),
        });
    }
    serde_json::from_str(&body).map_err(|err| ClientError::Parse(err.to_string()))
}

/// `Display` of `err` followed by its sources, where reqwest keeps the cause.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn ensure_success(status: ApiStatus, message: Option<String>) -> Result<(), ClientError> {
    match status {
        ApiStatus::Success => Ok(()),
        ApiStatus::Error => Err(ClientError::Api(
            message.unwrap_or_else(|| "backend reported an error".to_string()),
        )),
    }
}

/// Human-readable message from an error body. FastAPI wraps it in `detail`.
fn error_detail(body: &str, status: StatusCode) -> String {
    if let Ok(serde_json::Value::Object(fields)) = serde_json::from_str(body) {
        for key in ["detail", "message"] {
            match fields.get(key) {
                Some(serde_json::Value::String(text)) => return text.clone(),
                Some(serde_json::Value::Null) | None => {}
                Some(other) => return other.to_string(),
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        trimmed.to_string()
    }
}

fn upload_filename(path: &Path) -> Result<String, ClientError> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| ClientError::InvalidRequest(format!("{:?} has no file name", path)))?;
    if !filename.to_lowercase().ends_with(".pdf") {
        return Err(ClientError::InvalidRequest(format!(
            "only PDF files can be uploaded: {filename}"
        )));
    }
    Ok(filename.to_string())
}

fn check_upload_size(size: u64, max: u64) -> Result<(), ClientError> {
    if size == 0 {
        return Err(ClientError::InvalidRequest("file is empty".to_string()));
    }
    if size > max {
        return Err(ClientError::InvalidRequest(format!(
            "file is {:.1} MiB, the limit is {} MiB",
            size as f64 / (1024.0 * 1024.0),
            max / (1024 * 1024)
        )));
    }
    Ok(())
}
