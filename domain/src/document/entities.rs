//! Document and passage entities

use crate::core::ids::{DocumentId, PassageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An ingested file.
///
/// Immutable once created except for metadata enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub filename: String,
    pub content_type: String,
    /// Where the original blob lives (object store key or path)
    pub storage_key: String,
    /// User id of the uploader; only the owner may delete
    pub owner: String,
    pub metadata: Map<String, Value>,
    pub uploaded_at: DateTime<Utc>,
}

impl Document {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        let id = DocumentId::generate();
        let filename = filename.into();
        let storage_key = format!("documents/{}/{}", id, filename);
        Self {
            id,
            filename,
            content_type: content_type.into(),
            storage_key,
            owner: owner.into(),
            metadata: Map::new(),
            uploaded_at: Utc::now(),
        }
    }

    /// Add or overwrite a metadata entry.
    pub fn enrich_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner == user_id
    }
}

/// A passage candidate returned by the ingestion collaborator.
///
/// Candidates carry no id: the core is the only writer of passage ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageCandidate {
    pub text: String,
    pub char_start: u64,
    pub char_end: u64,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// A chunk of a document's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub id: PassageId,
    pub doc_id: DocumentId,
    /// Position within the document; `(doc_id, index)` ordering is stable
    pub index: u32,
    pub text: String,
    pub char_start: u64,
    pub char_end: u64,
    pub page: Option<u32>,
    pub metadata: Map<String, Value>,
}

impl Passage {
    pub fn from_candidate(doc_id: &DocumentId, index: u32, candidate: PassageCandidate) -> Self {
        Self {
            id: PassageId::generate(),
            doc_id: doc_id.clone(),
            index,
            text: candidate.text,
            char_start: candidate.char_start,
            char_end: candidate.char_end,
            page: candidate.page,
            metadata: candidate.metadata,
        }
    }

    /// Character length of the span this passage covers.
    pub fn span_len(&self) -> u64 {
        self.char_end.saturating_sub(self.char_start)
    }
}
