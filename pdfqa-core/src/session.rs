use parking_lot::Mutex;
use tracing::{info, instrument};

use crate::{
    BoundingBox, ChatAnswer, ChatSource, DocumentId, DocumentRecord, HighlightLocator,
    LocatorError, MatchLocation,
};

pub const MIN_SCALE: f32 = 0.25;
pub const MAX_SCALE: f32 = 4.0;

#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub question: String,
    pub answer: ChatAnswer,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewCommand {
    NextMatch { count: usize },
    PrevMatch { count: usize },
    FirstMatch,
    LastMatch,
    ScaleBy { factor: f32 },
    ResetScale,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    DocumentOpened(DocumentId),
    DocumentClosed(DocumentId),
    MatchSelected {
        document_id: DocumentId,
        index: usize,
        total: usize,
        page_number: u32,
        /// Already multiplied by the session scale.
        bbox: BoundingBox,
    },
    MatchNotFound {
        document_id: DocumentId,
        query: String,
    },
    ScaleChanged(f32),
}

/// State of one document view: the open document, the chat that led to it,
/// zoom, and the locator that owns match navigation.
pub struct ViewSession {
    locator: HighlightLocator,
    document: Option<DocumentRecord>,
    history: Vec<ChatTurn>,
    scale: f32,
    events: Mutex<Vec<ViewEvent>>,
}

impl ViewSession {
    pub fn new(locator: HighlightLocator) -> Self {
        Self::with_scale(locator, 1.0)
    }

    pub fn with_scale(locator: HighlightLocator, scale: f32) -> Self {
        Self {
            locator,
            document: None,
            history: Vec::new(),
            scale: scale.clamp(MIN_SCALE, MAX_SCALE),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn drain_events(&self) -> Vec<ViewEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn locator(&self) -> &HighlightLocator {
        &self.locator
    }

    pub fn document(&self) -> Option<&DocumentRecord> {
        self.document.as_ref()
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn record_turn(&mut self, question: impl Into<String>, answer: ChatAnswer) {
        self.history.push(ChatTurn {
            question: question.into(),
            answer,
        });
    }

    pub fn open_document(&mut self, record: DocumentRecord) {
        let changed = self
            .document
            .as_ref()
            .map_or(true, |current| current.id != record.id);
        if changed {
            if let Some(previous) = self.document.take() {
                self.events
                    .lock()
                    .push(ViewEvent::DocumentClosed(previous.id));
            }
            self.locator.reset();
            self.events
                .lock()
                .push(ViewEvent::DocumentOpened(record.id.clone()));
        }
        self.document = Some(record);
    }

    pub fn close_document(&mut self) {
        if let Some(doc) = self.document.take() {
            self.locator.reset();
            self.events.lock().push(ViewEvent::DocumentClosed(doc.id));
        }
    }

    /// Search `text` in the open document and select the first match.
    #[instrument(skip(self, text))]
    pub async fn locate(&mut self, text: &str) -> Result<MatchLocation, LocatorError> {
        let document_id = match &self.document {
            Some(doc) => doc.id.clone(),
            None => return Err(LocatorError::NoDocument),
        };
        match self.locator.search(&document_id, text).await {
            Ok(mut locations) => {
                let first = locations.swap_remove(0);
                self.emit_selection(&document_id, 0, &first);
                Ok(first)
            }
            Err(LocatorError::NotFound { document_id, query }) => {
                info!(%document_id, %query, "no match for snippet");
                self.events.lock().push(ViewEvent::MatchNotFound {
                    document_id: document_id.clone(),
                    query: query.clone(),
                });
                Err(LocatorError::NotFound { document_id, query })
            }
            Err(err) => Err(err),
        }
    }

    /// Open the document a chat source points into and look up its preview.
    pub async fn locate_source(
        &mut self,
        source: &ChatSource,
    ) -> Result<MatchLocation, LocatorError> {
        let already_open = self
            .document
            .as_ref()
            .map_or(false, |doc| doc.id == source.document_id);
        if !already_open {
            self.open_document(DocumentRecord::from_source(source));
        }
        self.locate(&source.content_preview).await
    }

    pub fn apply(&mut self, command: ViewCommand) -> Result<(), LocatorError> {
        match command {
            ViewCommand::NextMatch { count } => self.step(signed(count)),
            ViewCommand::PrevMatch { count } => self.step(-signed(count)),
            ViewCommand::FirstMatch => self.jump(0),
            ViewCommand::LastMatch => self.jump(usize::MAX),
            ViewCommand::ScaleBy { factor } => {
                self.set_scale(self.scale * factor);
                Ok(())
            }
            ViewCommand::ResetScale => {
                self.set_scale(1.0);
                Ok(())
            }
        }
    }

    fn step(&mut self, delta: isize) -> Result<(), LocatorError> {
        let before = self.locator.current_index();
        let location = self.locator.navigate(delta)?;
        self.emit_if_moved(before, location);
        Ok(())
    }

    fn jump(&mut self, index: usize) -> Result<(), LocatorError> {
        let before = self.locator.current_index();
        let location = self.locator.select(index)?;
        self.emit_if_moved(before, location);
        Ok(())
    }

    fn emit_if_moved(&self, before: Option<usize>, location: MatchLocation) {
        let after = self.locator.current_index();
        if after == before {
            return;
        }
        if let (Some(index), Some(document_id)) = (after, self.locator.snapshot().document_id) {
            self.emit_selection(&document_id, index, &location);
        }
    }

    fn emit_selection(&self, document_id: &str, index: usize, location: &MatchLocation) {
        let total = self.locator.snapshot().results.len();
        self.events.lock().push(ViewEvent::MatchSelected {
            document_id: document_id.to_string(),
            index,
            total,
            page_number: location.page_number,
            bbox: location.bbox.scaled(f64::from(self.scale)),
        });
    }

    fn set_scale(&mut self, scale: f32) {
        let scale = scale.clamp(MIN_SCALE, MAX_SCALE);
        if (self.scale - scale).abs() > f32::EPSILON {
            self.scale = scale;
            self.events.lock().push(ViewEvent::ScaleChanged(scale));
        }
    }
}

fn signed(count: usize) -> isize {
    isize::try_from(count).unwrap_or(isize::MAX)
}

impl DocumentRecord {
    /// Minimal record for a document only known through a chat source.
    pub fn from_source(source: &ChatSource) -> Self {
        Self {
            id: source.document_id.clone(),
            filename: source.filename.clone(),
            url: None,
            status: "completed".to_string(),
            created_at: None,
            processed_at: None,
            chunk_count: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use url::Url;

    use crate::{BackendError, HighlightRequest, LocationBackend, SearchQuery};

    struct PagedBackend {
        pages: Vec<u32>,
        lookups: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl LocationBackend for PagedBackend {
        async fn page_locations(
            &self,
            _document_id: &str,
            _query: &SearchQuery,
        ) -> Result<Vec<MatchLocation>, BackendError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .pages
                .iter()
                .map(|&page_number| MatchLocation {
                    page_number,
                    bbox: BoundingBox::new(10.0, 20.0, 200.0, 40.0),
                    context: String::new(),
                    matched_text: String::new(),
                })
                .collect())
        }

        async fn highlight(&self, _request: &HighlightRequest) -> Result<Url, BackendError> {
            Err(BackendError::transport("not used"))
        }
    }

    fn session_with_pages(pages: Vec<u32>) -> ViewSession {
        let backend = Arc::new(PagedBackend {
            pages,
            lookups: AtomicUsize::new(0),
        });
        ViewSession::new(HighlightLocator::new(backend))
    }

    fn source(document_id: &str, preview: &str) -> ChatSource {
        ChatSource {
            document_id: document_id.to_string(),
            filename: "handbook.pdf".to_string(),
            chunk_index: 0,
            relevance_score: 0.82,
            content_preview: preview.to_string(),
            page_number: None,
            bbox: None,
        }
    }

    #[tokio::test]
    async fn locate_source_opens_document_and_selects_first_match() {
        let mut session = session_with_pages(vec![3, 8]);
        session.apply(ViewCommand::ScaleBy { factor: 2.0 }).unwrap();
        session.drain_events();

        let first = session
            .locate_source(&source("doc-1", "Annual leave accrues monthly."))
            .await
            .unwrap();
        assert_eq!(first.page_number, 3);
        assert_eq!(session.document().map(|d| d.id.as_str()), Some("doc-1"));

        let events = session.drain_events();
        assert_eq!(events[0], ViewEvent::DocumentOpened("doc-1".to_string()));
        assert_eq!(
            events[1],
            ViewEvent::MatchSelected {
                document_id: "doc-1".to_string(),
                index: 0,
                total: 2,
                page_number: 3,
                bbox: BoundingBox::new(20.0, 40.0, 400.0, 80.0),
            }
        );
    }

    #[tokio::test]
    async fn navigation_commands_emit_only_on_movement() {
        let mut session = session_with_pages(vec![1, 2]);
        session.open_document(DocumentRecord::from_source(&source("doc", "")));
        session.locate("probation period rules").await.unwrap();
        session.drain_events();

        session.apply(ViewCommand::PrevMatch { count: 1 }).unwrap();
        assert!(session.drain_events().is_empty());

        session.apply(ViewCommand::NextMatch { count: 5 }).unwrap();
        let events = session.drain_events();
        assert!(matches!(
            events.as_slice(),
            [ViewEvent::MatchSelected { index: 1, page_number: 2, .. }]
        ));

        session.apply(ViewCommand::LastMatch).unwrap();
        assert!(session.drain_events().is_empty());
        session.apply(ViewCommand::FirstMatch).unwrap();
        assert_eq!(session.locator().current_index(), Some(0));
    }

    #[tokio::test]
    async fn not_found_is_reported_as_event() {
        let mut session = session_with_pages(Vec::new());
        session.open_document(DocumentRecord::from_source(&source("doc", "")));
        session.drain_events();

        let err = session.locate("nowhere to be seen").await.unwrap_err();
        assert!(matches!(err, LocatorError::NotFound { .. }));
        assert_eq!(
            session.drain_events(),
            vec![ViewEvent::MatchNotFound {
                document_id: "doc".to_string(),
                query: "nowhere to be seen".to_string(),
            }]
        );
        assert_eq!(
            session.apply(ViewCommand::NextMatch { count: 1 }),
            Err(LocatorError::NoResults)
        );
    }

    #[tokio::test]
    async fn switching_documents_resets_navigation() {
        let mut session = session_with_pages(vec![4]);
        session.open_document(DocumentRecord::from_source(&source("doc-a", "")));
        session.locate("a phrase").await.unwrap();
        assert!(session.locator().current().is_some());

        session.open_document(DocumentRecord::from_source(&source("doc-b", "")));
        assert!(session.locator().current().is_none());
        assert_eq!(session.locator().status(), crate::LocatorStatus::Idle);

        session.close_document();
        assert!(session.document().is_none());
        assert_eq!(session.locate("a phrase").await, Err(LocatorError::NoDocument));
    }

    #[test]
    fn scale_is_clamped() {
        let mut session = session_with_pages(Vec::new());
        session.apply(ViewCommand::ScaleBy { factor: 100.0 }).unwrap();
        assert_eq!(session.scale(), MAX_SCALE);
        session.apply(ViewCommand::ScaleBy { factor: 0.0 }).unwrap();
        assert_eq!(session.scale(), MIN_SCALE);
        session.apply(ViewCommand::ResetScale).unwrap();
        assert_eq!(session.scale(), 1.0);
    }

    #[test]
    fn chat_history_is_kept_per_session() {
        let mut session = session_with_pages(Vec::new());
        session.record_turn(
            "How long is probation?",
            ChatAnswer {
                answer: "Three months.".to_string(),
                sources: vec![source("doc", "Probation lasts three months.")],
                document_ids: vec!["doc".to_string()],
                processing_time: 0.4,
            },
        );
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.history()[0].answer.sources[0].document_id, "doc");
    }
}
