use std::fmt;

use thiserror::Error;

/// Failure reported by the backend or the transport underneath it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    pub status: Option<u16>,
    pub message: String,
}

impl BackendError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {}: {}", status, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for BackendError {}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocatorError {
    #[error("search text is empty")]
    EmptyQuery,
    #[error("no match for {query:?} in document {document_id}")]
    NotFound { document_id: String, query: String },
    #[error("location lookup failed: {0}")]
    Backend(BackendError),
    #[error("no document is open")]
    NoDocument,
    #[error("no search results to navigate")]
    NoResults,
    #[error("highlight request failed: {0}")]
    Highlight(BackendError),
    #[error("page number {0} is out of range")]
    InvalidPage(u32),
    #[error("search was superseded by a newer request")]
    Superseded,
}

impl LocatorError {
    /// Errors the user can sensibly retry by hand.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LocatorError::Backend(_) | LocatorError::Highlight(_))
    }
}
