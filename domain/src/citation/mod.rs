//! Citation domain module
//!
//! - [`token`] - the `[cite:doc|page|passage]` token syntax
//! - [`validator`] - pure validation of summarizer citations against the
//!   retrieved passage set
//! - [`Citation`] - a verified citation as returned to callers

pub mod token;
pub mod validator;

pub use token::{CitationParseError, CitationToken, extract_inline};
pub use validator::{ValidationOutcome, resolve, validate};

use crate::core::ids::{DocumentId, PassageId};
use crate::core::string::excerpt;
use crate::document::Passage;
use serde::{Deserialize, Serialize};

/// Maximum excerpt length quoted in a citation
const EXCERPT_LEN: usize = 150;

/// A verified citation attached to a summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub doc_id: DocumentId,
    pub passage_id: PassageId,
    pub page: Option<u32>,
    /// One-line excerpt of the cited passage
    pub text: String,
    /// Fused retrieval score of the passage
    pub relevance_score: f64,
}

impl Citation {
    pub fn from_passage(passage: &Passage, relevance_score: f64) -> Self {
        Self {
            doc_id: passage.doc_id.clone(),
            passage_id: passage.id.clone(),
            page: passage.page,
            text: excerpt(&passage.text, EXCERPT_LEN),
            relevance_score,
        }
    }

    pub fn token(&self) -> CitationToken {
        CitationToken::new(self.doc_id.clone(), self.page, self.passage_id.clone())
    }
}
