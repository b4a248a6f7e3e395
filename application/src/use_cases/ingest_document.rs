//! Ingest Document use case
//!
//! Blob → ingestion collaborator → passages with core-assigned ids →
//! store (`document_ingested`) → embeddings → retrieval index.
//!
//! The document is persisted before indexing so its passages exist when the
//! retriever returns them. If embedding or indexing fails the document is
//! deleted again, leaving no half-ingested state behind.

use crate::ports::collaborators::{
    CollaboratorError, EmbeddingClient, IndexEntry, IngestionClient, RetrievalIndex,
};
use crate::ports::store::{PersistentStore, StoreError};
use attest_domain::{Actor, Document, DocumentId, Passage};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Errors that can occur during ingestion
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Document is empty")]
    EmptyDocument,

    #[error("Extraction failed: {0}")]
    Extraction(CollaboratorError),

    #[error("No passages could be extracted from {0}")]
    NoPassages(String),

    #[error("Embedding failed: {0}")]
    Embedding(CollaboratorError),

    #[error("Embedding service returned {got} vectors for {expected} passages")]
    VectorCount { expected: usize, got: usize },

    #[error("Indexing failed: {0}")]
    Indexing(CollaboratorError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Input for the ingest use case
#[derive(Debug, Clone)]
pub struct IngestInput {
    pub owner: String,
    pub filename: String,
    pub content_type: String,
    pub blob: Vec<u8>,
}

impl IngestInput {
    pub fn new(
        owner: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        blob: Vec<u8>,
    ) -> Self {
        Self {
            owner: owner.into(),
            filename: filename.into(),
            content_type: content_type.into(),
            blob,
        }
    }
}

/// Output of a successful ingestion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestOutput {
    pub document_id: DocumentId,
    pub filename: String,
    pub passages_count: usize,
}

/// Use case for ingesting a document
pub struct IngestDocumentUseCase {
    store: Arc<dyn PersistentStore>,
    ingestion: Arc<dyn IngestionClient>,
    embedding: Arc<dyn EmbeddingClient>,
    index: Arc<dyn RetrievalIndex>,
}

impl IngestDocumentUseCase {
    pub fn new(
        store: Arc<dyn PersistentStore>,
        ingestion: Arc<dyn IngestionClient>,
        embedding: Arc<dyn EmbeddingClient>,
        index: Arc<dyn RetrievalIndex>,
    ) -> Self {
        Self {
            store,
            ingestion,
            embedding,
            index,
        }
    }

    pub async fn execute(&self, input: IngestInput) -> Result<IngestOutput, IngestError> {
        if input.blob.is_empty() {
            return Err(IngestError::EmptyDocument);
        }

        let candidates = self
            .ingestion
            .extract(&input.blob, &input.filename, &input.content_type)
            .await
            .map_err(IngestError::Extraction)?;
        let candidates: Vec<_> = candidates
            .into_iter()
            .filter(|c| !c.text.trim().is_empty())
            .collect();
        if candidates.is_empty() {
            return Err(IngestError::NoPassages(input.filename));
        }

        let mut document = Document::new(&input.filename, &input.content_type, &input.owner);
        document.enrich_metadata("size_bytes", input.blob.len() as u64);
        document.enrich_metadata("passages", candidates.len() as u64);
        let passages: Vec<Passage> = candidates
            .into_iter()
            .enumerate()
            .map(|(i, c)| Passage::from_candidate(&document.id, i as u32, c))
            .collect();

        self.store
            .insert_document(&document, &passages, Actor::user(input.owner.clone()))
            .await?;

        if let Err(e) = self.index_passages(&document, &passages).await {
            warn!(
                document_id = %document.id,
                error = %e,
                "Indexing failed, removing document"
            );
            if let Err(cleanup) = self.store.delete_document(&document.id, Actor::System).await {
                warn!(document_id = %document.id, error = %cleanup, "Cleanup failed");
            }
            return Err(e);
        }

        info!(
            document_id = %document.id,
            filename = %document.filename,
            passages = passages.len(),
            "Document ingested"
        );
        Ok(IngestOutput {
            document_id: document.id,
            filename: document.filename,
            passages_count: passages.len(),
        })
    }

    async fn index_passages(
        &self,
        document: &Document,
        passages: &[Passage],
    ) -> Result<(), IngestError> {
        let texts: Vec<String> = passages.iter().map(|p| p.text.clone()).collect();
        let vectors = self
            .embedding
            .embed(&texts)
            .await
            .map_err(IngestError::Embedding)?;
        if vectors.len() != passages.len() {
            return Err(IngestError::VectorCount {
                expected: passages.len(),
                got: vectors.len(),
            });
        }

        let entries = passages
            .iter()
            .zip(vectors)
            .map(|(p, vector)| IndexEntry {
                passage_id: p.id.clone(),
                doc_id: p.doc_id.clone(),
                owner: document.owner.clone(),
                page: p.page,
                text: p.text.clone(),
                vector,
            })
            .collect();
        self.index
            .upsert(entries)
            .await
            .map_err(IngestError::Indexing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::collaborators::{IndexQuery, IndexResults};
    use crate::testing::MemoryStore;
    use async_trait::async_trait;
    use attest_domain::{EventType, PassageCandidate};
    use std::sync::Mutex;

    struct SplitLines;

    #[async_trait]
    impl IngestionClient for SplitLines {
        async fn extract(
            &self,
            blob: &[u8],
            _filename: &str,
            _content_type: &str,
        ) -> Result<Vec<PassageCandidate>, CollaboratorError> {
            let text = String::from_utf8_lossy(blob);
            let mut offset = 0u64;
            Ok(text
                .lines()
                .enumerate()
                .map(|(i, line)| {
                    let start = offset;
                    offset += line.len() as u64 + 1;
                    PassageCandidate {
                        text: line.to_string(),
                        char_start: start,
                        char_end: start + line.len() as u64,
                        page: Some(i as u32 + 1),
                        metadata: Default::default(),
                    }
                })
                .collect())
        }
    }

    struct FixedEmbedding {
        fail: bool,
    }

    #[async_trait]
    impl EmbeddingClient for FixedEmbedding {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CollaboratorError> {
            if self.fail {
                return Err(CollaboratorError::Unavailable("embedding down".into()));
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    #[derive(Default)]
    struct RecordingIndex {
        entries: Mutex<Vec<IndexEntry>>,
    }

    #[async_trait]
    impl RetrievalIndex for RecordingIndex {
        async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<(), CollaboratorError> {
            self.entries.lock().unwrap().extend(entries);
            Ok(())
        }

        async fn search(&self, _query: IndexQuery) -> Result<IndexResults, CollaboratorError> {
            Ok(IndexResults::default())
        }

        async fn remove_document(&self, doc_id: &DocumentId) -> Result<(), CollaboratorError> {
            self.entries.lock().unwrap().retain(|e| &e.doc_id != doc_id);
            Ok(())
        }
    }

    fn use_case(
        fail_embedding: bool,
    ) -> (IngestDocumentUseCase, Arc<MemoryStore>, Arc<RecordingIndex>) {
        let store = Arc::new(MemoryStore::new());
        let index = Arc::new(RecordingIndex::default());
        let use_case = IngestDocumentUseCase::new(
            store.clone(),
            Arc::new(SplitLines),
            Arc::new(FixedEmbedding {
                fail: fail_embedding,
            }),
            index.clone(),
        );
        (use_case, store, index)
    }

    fn input(text: &str) -> IngestInput {
        IngestInput::new("alice", "incidents.txt", "text/plain", text.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_ingest_assigns_ids_and_indexes() {
        let (use_case, store, index) = use_case(false);
        let output = use_case
            .execute(input("Login failures spiked.\n\nRollback fixed it."))
            .await
            .unwrap();

        assert_eq!(output.passages_count, 2);
        let passages = store.list_passages(&output.document_id).await.unwrap();
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].index, 0);
        assert_eq!(passages[1].text, "Rollback fixed it.");
        assert_ne!(passages[0].id, passages[1].id);

        let entries = index.entries.lock().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.owner == "alice"));
        assert_eq!(entries[0].passage_id, passages[0].id);

        assert!(
            store
                .events()
                .iter()
                .any(|e| e.event_type == EventType::DocumentIngested)
        );
    }

    #[tokio::test]
    async fn test_embedding_failure_removes_document() {
        let (use_case, store, index) = use_case(true);
        let err = use_case.execute(input("Login failures spiked.")).await.unwrap_err();
        assert!(matches!(err, IngestError::Embedding(_)));
        assert!(index.entries.lock().unwrap().is_empty());
        assert!(
            store
                .events()
                .iter()
                .any(|e| e.event_type == EventType::DocumentDeleted)
        );
    }

    #[tokio::test]
    async fn test_empty_blob_is_rejected() {
        let (use_case, _, _) = use_case(false);
        let err = use_case.execute(input("")).await.unwrap_err();
        assert!(matches!(err, IngestError::EmptyDocument));
    }
}
