//! Reduction of retrieved passages to short search queries.

use std::fmt;

use crate::LocatorError;

pub const DEFAULT_MAX_QUERY_CHARS: usize = 100;

/// A period is only treated as a clause end strictly inside this window
/// (character positions).
const SENTENCE_WINDOW_START: usize = 10;
const SENTENCE_WINDOW_END: usize = 100;
const FALLBACK_TOKENS: usize = 10;

/// Pick a search-worthy fragment out of a longer passage.
///
/// Returns the leading clause when its terminating period lies between
/// character 10 and 100; otherwise the first ten whitespace-separated tokens.
pub fn derive_snippet(text: &str) -> String {
    let trimmed = text.trim();
    if let Some(end) = clause_end(trimmed) {
        return trimmed[..end].to_string();
    }
    trimmed
        .split_whitespace()
        .take(FALLBACK_TOKENS)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Byte offset just past the first period in the sentence window.
fn clause_end(text: &str) -> Option<usize> {
    text.char_indices()
        .enumerate()
        .skip(SENTENCE_WINDOW_START + 1)
        .take_while(|(position, _)| *position < SENTENCE_WINDOW_END)
        .find(|(_, (_, c))| *c == '.')
        .map(|(_, (offset, c))| offset + c.len_utf8())
}

/// Bounded, non-empty query text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchQuery(String);

impl SearchQuery {
    /// Trims `text` and truncates it to `max_chars`. Over-long input is cut,
    /// never rejected.
    pub fn new(text: &str, max_chars: usize) -> Result<Self, LocatorError> {
        let trimmed = text.trim();
        if trimmed.is_empty() || max_chars == 0 {
            return Err(LocatorError::EmptyQuery);
        }
        let cut = match trimmed.char_indices().nth(max_chars) {
            Some((offset, _)) => trimmed[..offset].trim_end(),
            None => trimmed,
        };
        Ok(Self(cut.to_string()))
    }

    /// Snippet derivation followed by truncation.
    pub fn from_passage(passage: &str, max_chars: usize) -> Result<Self, LocatorError> {
        Self::new(&derive_snippet(passage), max_chars)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SearchQuery {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clause_inside_window_is_kept_with_its_period() {
        let text = "  The allowance is paid monthly. Claims must be filed by March.  ";
        assert_eq!(derive_snippet(text), "The allowance is paid monthly.");
    }

    #[test]
    fn first_ten_tokens_without_qualifying_period() {
        let text = "Government officers with at least 3 months of employment must \
                    submit proof of service to the personnel office in order to qualify";
        assert_eq!(
            derive_snippet(text),
            "Government officers with at least 3 months of employment must"
        );
    }

    #[test]
    fn short_text_without_period_is_returned_whole() {
        assert_eq!(derive_snippet("  annual leave policy  "), "annual leave policy");
    }

    #[test]
    fn period_before_window_is_ignored() {
        // "Dr." ends at index 2, so the clause rule does not apply.
        let text = "Dr. Kim approved the request for leave without pay during the audit period";
        assert_eq!(
            derive_snippet(text),
            "Dr. Kim approved the request for leave without pay during"
        );
    }

    #[test]
    fn period_at_window_edges() {
        let at_ten = format!("{}. {}", "a".repeat(10), "b c d");
        assert_eq!(derive_snippet(&at_ten), at_ten);

        let at_eleven = format!("{}. rest", "a".repeat(11));
        assert_eq!(derive_snippet(&at_eleven), format!("{}.", "a".repeat(11)));

        let at_hundred = format!("{}. tail", "x".repeat(100));
        assert_eq!(derive_snippet(&at_hundred), at_hundred);
    }

    #[test]
    fn window_counts_characters_not_bytes() {
        let text = "근로자는 최소 3개월 이상 근무해야 합니다. 증빙 서류를 제출하세요.";
        assert_eq!(derive_snippet(text), "근로자는 최소 3개월 이상 근무해야 합니다.");
    }

    #[test]
    fn whitespace_only_query_is_empty() {
        assert_eq!(SearchQuery::new(" \n\t ", 100), Err(LocatorError::EmptyQuery));
        assert_eq!(
            SearchQuery::from_passage("   ", 100),
            Err(LocatorError::EmptyQuery)
        );
    }

    #[test]
    fn long_query_is_truncated_not_rejected() {
        let long = "word ".repeat(60);
        let query = SearchQuery::new(&long, DEFAULT_MAX_QUERY_CHARS).unwrap();
        assert!(query.char_len() <= DEFAULT_MAX_QUERY_CHARS);
        assert!(query.as_str().starts_with("word word"));
        assert!(!query.as_str().ends_with(' '));
    }

    #[test]
    fn truncation_respects_multibyte_boundaries() {
        let query = SearchQuery::new(&"가".repeat(150), 100).unwrap();
        assert_eq!(query.char_len(), 100);
    }
}
