//! Citation tokens.
//!
//! A citation token is the structured reference a summary uses to point at
//! a passage. The textual form is
//!
//! ```text
//! [cite:<doc_id>|<page>|<passage_id>]
//! ```
//!
//! where `<page>` is a page number or `-` when the passage has none. Tokens
//! may appear inline in the summary text and in the summarizer's explicit
//! citation list (with or without the surrounding brackets).

use crate::core::ids::{DocumentId, PassageId};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

const PREFIX: &str = "cite:";
const NO_PAGE: &str = "-";

/// Why a token could not be parsed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CitationParseError {
    #[error("citation token must start with '{PREFIX}'")]
    MissingPrefix,

    #[error("citation token must have 3 '|'-separated fields, found {0}")]
    FieldCount(usize),

    #[error("citation token has an empty {0}")]
    EmptyField(&'static str),

    #[error("citation page '{0}' is not a number or '-'")]
    InvalidPage(String),
}

/// A parsed citation token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CitationToken {
    pub doc_id: DocumentId,
    pub page: Option<u32>,
    pub passage_id: PassageId,
}

impl CitationToken {
    pub fn new(doc_id: DocumentId, page: Option<u32>, passage_id: PassageId) -> Self {
        Self {
            doc_id,
            page,
            passage_id,
        }
    }

    /// Parse a token, with or without surrounding brackets.
    pub fn parse(raw: &str) -> Result<Self, CitationParseError> {
        let trimmed = raw.trim();
        let inner = trimmed
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .unwrap_or(trimmed);
        let body = inner
            .strip_prefix(PREFIX)
            .ok_or(CitationParseError::MissingPrefix)?;

        let fields: Vec<&str> = body.split('|').map(str::trim).collect();
        if fields.len() != 3 {
            return Err(CitationParseError::FieldCount(fields.len()));
        }

        let (doc, page, passage) = (fields[0], fields[1], fields[2]);
        if doc.is_empty() {
            return Err(CitationParseError::EmptyField("doc_id"));
        }
        if passage.is_empty() {
            return Err(CitationParseError::EmptyField("passage_id"));
        }
        let page = match page {
            NO_PAGE => None,
            p => Some(
                p.parse::<u32>()
                    .map_err(|_| CitationParseError::InvalidPage(p.to_string()))?,
            ),
        };

        Ok(Self {
            doc_id: DocumentId::new(doc),
            page,
            passage_id: PassageId::new(passage),
        })
    }

    /// Render the bracketed textual form.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CitationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let page = self
            .page
            .map(|p| p.to_string())
            .unwrap_or_else(|| NO_PAGE.to_string());
        write!(f, "[{}{}|{}|{}]", PREFIX, self.doc_id, page, self.passage_id)
    }
}

fn inline_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Anything bracketed that starts with the prefix, even if malformed
        Regex::new(r"\[cite:[^\]\[]*\]").unwrap_or_else(|_| unreachable!("static pattern"))
    })
}

/// Extract every inline citation token (raw text) from a summary.
pub fn extract_inline(text: &str) -> Vec<String> {
    inline_pattern()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_and_without_brackets() {
        let a = CitationToken::parse("[cite:d1|3|p1]").unwrap();
        let b = CitationToken::parse("cite:d1|3|p1").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.page, Some(3));
        assert_eq!(a.passage_id.as_str(), "p1");
    }

    #[test]
    fn test_parse_without_page() {
        let t = CitationToken::parse("[cite:d1|-|p2]").unwrap();
        assert_eq!(t.page, None);
        assert_eq!(t.render(), "[cite:d1|-|p2]");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(
            CitationToken::parse("[ref:d1|1|p1]"),
            Err(CitationParseError::MissingPrefix)
        );
        assert_eq!(
            CitationToken::parse("[cite:d1|p1]"),
            Err(CitationParseError::FieldCount(2))
        );
        assert_eq!(
            CitationToken::parse("[cite:|1|p1]"),
            Err(CitationParseError::EmptyField("doc_id"))
        );
        assert_eq!(
            CitationToken::parse("[cite:d1|one|p1]"),
            Err(CitationParseError::InvalidPage("one".to_string()))
        );
        assert!(CitationToken::parse("").is_err());
    }

    #[test]
    fn test_extract_inline_includes_malformed_tokens() {
        let text = "Logins failed [cite:d1|2|p1] twice [cite:broken] and [other:x].";
        assert_eq!(
            extract_inline(text),
            vec!["[cite:d1|2|p1]".to_string(), "[cite:broken]".to_string()]
        );
    }
}
