use serde::{Deserialize, Serialize};
use url::Url;

mod error;
mod locator;
mod session;
mod snippet;

pub use error::{BackendError, LocatorError};
pub use locator::{HighlightLocator, LocatorStatus, NavigationState};
pub use session::{ChatTurn, ViewCommand, ViewEvent, ViewSession, MAX_SCALE, MIN_SCALE};
pub use snippet::{derive_snippet, SearchQuery, DEFAULT_MAX_QUERY_CHARS};

pub type DocumentId = String;

/// Rectangle in page-pixel space at 100% zoom.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BoundingBox {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f64 {
        (self.x1 - self.x0).abs()
    }

    pub fn height(&self) -> f64 {
        (self.y1 - self.y0).abs()
    }

    /// Coordinates at the given zoom factor. The locator never calls this;
    /// it is for whoever draws the box.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            x0: self.x0 * factor,
            y0: self.y0 * factor,
            x1: self.x1 * factor,
            y1: self.y1 * factor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchLocation {
    pub page_number: u32,
    pub bbox: BoundingBox,
    #[serde(default)]
    pub context: String,
    #[serde(default, alias = "text")]
    pub matched_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighlightRequest {
    pub document_id: DocumentId,
    pub page_number: u32,
    pub search_text: String,
}

/// One retrieved chunk backing a chat answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSource {
    pub document_id: DocumentId,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub chunk_index: u32,
    #[serde(default)]
    pub relevance_score: f64,
    #[serde(default)]
    pub content_preview: String,
    #[serde(default)]
    pub page_number: Option<u32>,
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatAnswer {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<ChatSource>,
    #[serde(default)]
    pub document_ids: Vec<DocumentId>,
    #[serde(default)]
    pub processing_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub filename: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_document_status")]
    pub status: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub processed_at: Option<String>,
    #[serde(default)]
    pub chunk_count: Option<u32>,
}

fn default_document_status() -> String {
    "pending".to_string()
}

impl DocumentRecord {
    pub fn is_processed(&self) -> bool {
        self.status == "completed"
    }
}

/// Location lookup and highlight rendering, as served by the Q&A backend.
#[async_trait::async_trait]
pub trait LocationBackend: Send + Sync {
    async fn page_locations(
        &self,
        document_id: &str,
        query: &SearchQuery,
    ) -> Result<Vec<MatchLocation>, BackendError>;

    async fn highlight(&self, request: &HighlightRequest) -> Result<Url, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_box_scales_every_coordinate() {
        let bbox = BoundingBox::new(10.0, 20.0, 200.0, 40.0);
        let scaled = bbox.scaled(1.5);
        assert_eq!(scaled, BoundingBox::new(15.0, 30.0, 300.0, 60.0));
        assert_eq!(bbox.width(), 190.0);
        assert_eq!(bbox.height(), 20.0);
    }

    #[test]
    fn match_location_accepts_backend_text_alias() {
        let payload = r#"{
            "page_number": 7,
            "bbox": {"x0": 10, "y0": 20, "x1": 200, "y1": 40},
            "context": "... proof of service ...",
            "text": "proof of service"
        }"#;
        let location: MatchLocation = serde_json::from_str(payload).unwrap();
        assert_eq!(location.page_number, 7);
        assert_eq!(location.matched_text, "proof of service");
        assert_eq!(location.bbox.x1, 200.0);
    }

    #[test]
    fn document_status_defaults_to_pending() {
        let record: DocumentRecord =
            serde_json::from_str(r#"{"id": "doc-1", "filename": "handbook.pdf"}"#).unwrap();
        assert_eq!(record.status, "pending");
        assert!(!record.is_processed());

        let done = DocumentRecord {
            status: "completed".to_string(),
            ..record
        };
        assert!(done.is_processed());
    }

    #[test]
    fn chat_source_tolerates_missing_optional_fields() {
        let payload = r#"{"document_id": "doc-1", "content_preview": "Some text", "bbox": null}"#;
        let source: ChatSource = serde_json::from_str(payload).unwrap();
        assert_eq!(source.document_id, "doc-1");
        assert!(source.page_number.is_none());
        assert!(source.bbox.is_none());
    }
}
