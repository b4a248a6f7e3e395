//! Citation validation.
//!
//! [`validate`] cross-checks every citation token a summarizer emitted
//! against the exact passage set handed to it. It is a pure function: no
//! I/O, no panics on hostile input.
//!
//! The checked token set is the union of the explicit citation list and any
//! `[cite:...]` tokens found inline in the summary text, deduplicated while
//! preserving first-seen order.

use super::token::{CitationToken, extract_inline};
use crate::document::Passage;
use serde::{Deserialize, Serialize};

/// Result of validating a summary's citations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "offending", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Valid,
    /// Raw text of every token that is malformed or unverifiable
    Invalid(Vec<String>),
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid)
    }

    pub fn offending(&self) -> &[String] {
        match self {
            ValidationOutcome::Valid => &[],
            ValidationOutcome::Invalid(tokens) => tokens,
        }
    }
}

/// Validate citations against the allowed passage set.
pub fn validate(summary_text: &str, citations: &[String], allowed: &[Passage]) -> ValidationOutcome {
    let offending: Vec<String> = collect_tokens(summary_text, citations)
        .into_iter()
        .filter(|raw| check(raw, allowed).is_none())
        .collect();

    if offending.is_empty() {
        ValidationOutcome::Valid
    } else {
        ValidationOutcome::Invalid(offending)
    }
}

/// Return the verifiable citations paired with the passage they resolve to.
///
/// Unverifiable tokens are skipped; a passage cited several times appears once.
pub fn resolve<'a>(
    summary_text: &str,
    citations: &[String],
    allowed: &'a [Passage],
) -> Vec<(CitationToken, &'a Passage)> {
    let mut resolved: Vec<(CitationToken, &Passage)> = Vec::new();
    for raw in collect_tokens(summary_text, citations) {
        if let Some((token, passage)) = check(&raw, allowed)
            && !resolved.iter().any(|(_, p)| p.id == passage.id)
        {
            resolved.push((token, passage));
        }
    }
    resolved
}

fn collect_tokens(summary_text: &str, citations: &[String]) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for raw in citations.iter().cloned().chain(extract_inline(summary_text)) {
        let key = normalize(&raw);
        if !tokens.iter().any(|t| normalize(t) == key) {
            tokens.push(raw);
        }
    }
    tokens
}

/// Bracketed and bare forms of the same token compare equal.
fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed)
        .to_string()
}

fn check<'a>(raw: &str, allowed: &'a [Passage]) -> Option<(CitationToken, &'a Passage)> {
    let token = CitationToken::parse(raw).ok()?;
    let passage = allowed.iter().find(|p| p.id == token.passage_id)?;
    (passage.doc_id == token.doc_id && passage.page == token.page).then_some((token, passage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::{DocumentId, PassageId};
    use serde_json::Map;

    fn passage(id: &str, doc: &str, page: Option<u32>) -> Passage {
        Passage {
            id: PassageId::new(id),
            doc_id: DocumentId::new(doc),
            index: 0,
            text: format!("text of {}", id),
            char_start: 0,
            char_end: 10,
            page,
            metadata: Map::new(),
        }
    }

    fn allowed() -> Vec<Passage> {
        vec![passage("p1", "d1", Some(1)), passage("p2", "d1", None)]
    }

    #[test]
    fn test_valid_citations() {
        let citations = vec!["[cite:d1|1|p1]".to_string(), "cite:d1|-|p2".to_string()];
        let outcome = validate("Two failures [cite:d1|1|p1].", &citations, &allowed());
        assert_eq!(outcome, ValidationOutcome::Valid);
    }

    #[test]
    fn test_no_citations_is_valid() {
        assert!(validate("Nothing relevant was found.", &[], &allowed()).is_valid());
    }

    #[test]
    fn test_fabricated_passage_is_rejected() {
        let citations = vec!["[cite:d1|1|p1]".to_string(), "[cite:d1|1|p9]".to_string()];
        let outcome = validate("summary", &citations, &allowed());
        assert_eq!(
            outcome,
            ValidationOutcome::Invalid(vec!["[cite:d1|1|p9]".to_string()])
        );
    }

    #[test]
    fn test_mismatched_doc_or_page_is_rejected() {
        let citations = vec![
            "[cite:d2|1|p1]".to_string(), // wrong document
            "[cite:d1|4|p1]".to_string(), // wrong page
            "[cite:d1|3|p2]".to_string(), // p2 has no page
        ];
        let outcome = validate("", &citations, &allowed());
        assert_eq!(outcome.offending().len(), 3);
    }

    #[test]
    fn test_malformed_tokens_fail_without_panicking() {
        let hostile = vec![
            "[cite:".to_string(),
            "cite:d1|1|p1|extra".to_string(),
            "]]][[[".to_string(),
            "[cite:d1|-1|p1]".to_string(),
            "\u{0}".to_string(),
        ];
        let outcome = validate("[cite:|||]", &hostile, &allowed());
        assert_eq!(outcome.offending().len(), 6);
    }

    #[test]
    fn test_inline_tokens_are_checked() {
        let outcome = validate("Claim [cite:d1|1|p7].", &["[cite:d1|1|p1]".to_string()], &allowed());
        assert_eq!(
            outcome,
            ValidationOutcome::Invalid(vec!["[cite:d1|1|p7]".to_string()])
        );
    }

    #[test]
    fn test_duplicate_forms_reported_once() {
        let citations = vec!["cite:d1|1|p9".to_string(), "[cite:d1|1|p9]".to_string()];
        let outcome = validate("see [cite:d1|1|p9]", &citations, &allowed());
        assert_eq!(outcome.offending(), &["cite:d1|1|p9".to_string()]);
    }

    #[test]
    fn test_resolve_skips_unverifiable_and_dedupes() {
        let allowed = allowed();
        let citations = vec![
            "[cite:d1|1|p1]".to_string(),
            "[cite:d1|1|p9]".to_string(),
            "[cite:d1|-|p2]".to_string(),
        ];
        let resolved = resolve("again [cite:d1|1|p1]", &citations, &allowed);
        let ids: Vec<&str> = resolved.iter().map(|(_, p)| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
    }
}
