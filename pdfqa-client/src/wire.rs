//! Response envelopes of the Q&A backend.

use serde::{Deserialize, Serialize};

use pdfqa_core::{ChatSource, DocumentRecord, MatchLocation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ApiStatus {
    Success,
    Error,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NavigationPayload {
    pub status: ApiStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub locations: Vec<MatchLocation>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HighlightPayload {
    pub status: ApiStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub highlighted_pdf_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DocumentPayload {
    pub status: ApiStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<DocumentRecord>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequestBody<'a> {
    pub message: &'a str,
    pub max_results: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_ids: Option<&'a [String]>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatPayload {
    pub status: ApiStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub sources: Vec<ChatSource>,
    #[serde(default)]
    pub document_ids: Vec<String>,
    #[serde(default)]
    pub processing_time: f64,
}

/// One retrieved chunk from `POST chat/search`, with no generated answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub document_id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub chunk_index: u32,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub relevance_score: f64,
}

impl SearchHit {
    /// The hit as a chat source, ready for `ViewSession::locate_source`.
    pub fn to_source(&self) -> ChatSource {
        ChatSource {
            document_id: self.document_id.clone(),
            filename: self.filename.clone(),
            chunk_index: self.chunk_index,
            relevance_score: self.relevance_score,
            content_preview: self.content.clone(),
            page_number: None,
            bbox: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchPayload {
    pub status: ApiStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub results: Vec<SearchHit>,
}

/// Outcome of `POST upload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub document_id: String,
    pub filename: String,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub processing: bool,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UploadPayload {
    pub status: ApiStatus,
    #[serde(flatten)]
    pub receipt: UploadReceipt,
}

/// Outcome of `POST upload/retry/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryReceipt {
    pub document_id: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RetryPayload {
    pub status: ApiStatus,
    #[serde(flatten)]
    pub receipt: RetryReceipt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStatus {
    pub document_id: String,
    pub filename: String,
    pub processing_status: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub processed_at: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProcessingStatusPayload {
    pub status: ApiStatus,
    #[serde(flatten)]
    pub processing: ProcessingStatus,
}

/// Entry of `GET chat/documents`: documents ready for questions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailableDocument {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub processed_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AvailableDocumentsPayload {
    pub status: ApiStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub documents: Vec<AvailableDocument>,
}
