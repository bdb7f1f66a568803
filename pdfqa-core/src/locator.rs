use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::{
    DocumentId, HighlightRequest, LocationBackend, LocatorError, MatchLocation, SearchQuery,
    DEFAULT_MAX_QUERY_CHARS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocatorStatus {
    #[default]
    Idle,
    Searching,
    Found,
    NotFound,
    Failed,
}

#[derive(Debug, Clone, Default)]
pub struct NavigationState {
    pub document_id: Option<DocumentId>,
    pub query: Option<SearchQuery>,
    pub results: Vec<MatchLocation>,
    pub current_index: Option<usize>,
    pub status: LocatorStatus,
}

impl NavigationState {
    pub fn current(&self) -> Option<&MatchLocation> {
        self.current_index.and_then(|index| self.results.get(index))
    }
}

/// Turns retrieved passages into a navigable list of on-page matches.
///
/// Every operation takes `&self`. A search records a ticket from the
/// generation counter before awaiting the backend; when the response arrives
/// and a newer search or a reset has taken place in the meantime, the
/// response is dropped and the caller gets [`LocatorError::Superseded`].
pub struct HighlightLocator {
    backend: Arc<dyn LocationBackend>,
    max_query_chars: usize,
    generation: AtomicU64,
    state: Mutex<NavigationState>,
}

impl HighlightLocator {
    pub fn new(backend: Arc<dyn LocationBackend>) -> Self {
        Self::with_max_query_chars(backend, DEFAULT_MAX_QUERY_CHARS)
    }

    pub fn with_max_query_chars(backend: Arc<dyn LocationBackend>, max_query_chars: usize) -> Self {
        Self {
            backend,
            max_query_chars,
            generation: AtomicU64::new(0),
            state: Mutex::new(NavigationState::default()),
        }
    }

    pub fn status(&self) -> LocatorStatus {
        self.state.lock().status
    }

    pub fn current_index(&self) -> Option<usize> {
        self.state.lock().current_index
    }

    pub fn current(&self) -> Option<MatchLocation> {
        self.state.lock().current().cloned()
    }

    pub fn snapshot(&self) -> NavigationState {
        self.state.lock().clone()
    }

    /// Back to `Idle`. Any search still in flight is discarded when it lands.
    pub fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.state.lock() = NavigationState::default();
    }

    /// Derive a snippet from `text` and look it up in `document_id`.
    pub async fn search(
        &self,
        document_id: &str,
        text: &str,
    ) -> Result<Vec<MatchLocation>, LocatorError> {
        let query = SearchQuery::from_passage(text, self.max_query_chars)?;
        self.search_query(document_id, query).await
    }

    #[instrument(skip(self, query), fields(query = %query))]
    pub async fn search_query(
        &self,
        document_id: &str,
        query: SearchQuery,
    ) -> Result<Vec<MatchLocation>, LocatorError> {
        let ticket = self.begin_search(document_id, &query);
        let outcome = self.backend.page_locations(document_id, &query).await;

        let mut state = self.state.lock();
        if self.generation.load(Ordering::SeqCst) != ticket {
            debug!(ticket, "discarding stale location lookup");
            return Err(LocatorError::Superseded);
        }

        match outcome {
            Ok(locations) if locations.is_empty() => {
                state.status = LocatorStatus::NotFound;
                Err(LocatorError::NotFound {
                    document_id: document_id.to_string(),
                    query: query.into_string(),
                })
            }
            Ok(locations) => {
                debug!(matches = locations.len(), "location lookup succeeded");
                state.results = locations.clone();
                state.current_index = Some(0);
                state.status = LocatorStatus::Found;
                Ok(locations)
            }
            Err(err) => {
                warn!(error = %err, "location lookup failed");
                state.status = LocatorStatus::Failed;
                Err(LocatorError::Backend(err))
            }
        }
    }

    fn begin_search(&self, document_id: &str, query: &SearchQuery) -> u64 {
        let mut state = self.state.lock();
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *state = NavigationState {
            document_id: Some(document_id.to_string()),
            query: Some(query.clone()),
            results: Vec::new(),
            current_index: None,
            status: LocatorStatus::Searching,
        };
        ticket
    }

    /// Move the current match by `delta`, clamped to the result range.
    pub fn navigate(&self, delta: isize) -> Result<MatchLocation, LocatorError> {
        let mut state = self.state.lock();
        if state.results.is_empty() {
            return Err(LocatorError::NoResults);
        }
        let last = state.results.len() - 1;
        let current = state.current_index.unwrap_or(0);
        let next = if delta.is_negative() {
            current.saturating_sub(delta.unsigned_abs())
        } else {
            current.saturating_add(delta as usize).min(last)
        };
        state.current_index = Some(next);
        Ok(state.results[next].clone())
    }

    /// Jump to an absolute match index, clamped like [`navigate`](Self::navigate).
    pub fn select(&self, index: usize) -> Result<MatchLocation, LocatorError> {
        let mut state = self.state.lock();
        if state.results.is_empty() {
            return Err(LocatorError::NoResults);
        }
        let next = index.min(state.results.len() - 1);
        state.current_index = Some(next);
        Ok(state.results[next].clone())
    }

    #[instrument(skip(self, text))]
    pub async fn request_highlight(
        &self,
        document_id: &str,
        page_number: u32,
        text: &str,
    ) -> Result<Url, LocatorError> {
        if page_number == 0 {
            return Err(LocatorError::InvalidPage(page_number));
        }
        let query = SearchQuery::new(text, self.max_query_chars)?;
        let request = HighlightRequest {
            document_id: document_id.to_string(),
            page_number,
            search_text: query.into_string(),
        };
        self.backend.highlight(&request).await.map_err(|err| {
            warn!(error = %err, "highlight request failed");
            LocatorError::Highlight(err)
        })
    }

    /// Highlight the current match using the active query.
    pub async fn highlight_current(&self) -> Result<Url, LocatorError> {
        let (document_id, page_number, query) = {
            let state = self.state.lock();
            match (&state.document_id, state.current(), &state.query) {
                (Some(document_id), Some(location), Some(query)) => {
                    (document_id.clone(), location.page_number, query.clone())
                }
                _ => return Err(LocatorError::NoResults),
            }
        };
        self.request_highlight(&document_id, page_number, query.as_str())
            .await
    }
}
