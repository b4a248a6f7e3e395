//! Document access: passage listing and owner-only deletion.

use crate::ports::collaborators::{CollaboratorError, RetrievalIndex};
use crate::ports::store::{PersistentStore, StoreError};
use attest_domain::{Actor, Document, DocumentId, Passage};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors that can occur when accessing documents
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Document {0} not found")]
    NotFound(DocumentId),

    #[error("User {user_id} does not own document {document_id}")]
    Unauthorized {
        document_id: DocumentId,
        user_id: String,
    },

    #[error("Index error: {0}")]
    Index(#[from] CollaboratorError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Use case for reading and deleting documents
pub struct DocumentsUseCase {
    store: Arc<dyn PersistentStore>,
    index: Arc<dyn RetrievalIndex>,
}

impl DocumentsUseCase {
    pub fn new(store: Arc<dyn PersistentStore>, index: Arc<dyn RetrievalIndex>) -> Self {
        Self { store, index }
    }

    async fn owned(&self, id: &DocumentId, user_id: &str) -> Result<Document, DocumentError> {
        let document = self
            .store
            .get_document(id)
            .await?
            .ok_or_else(|| DocumentError::NotFound(id.clone()))?;
        if !document.is_owned_by(user_id) {
            return Err(DocumentError::Unauthorized {
                document_id: id.clone(),
                user_id: user_id.to_string(),
            });
        }
        Ok(document)
    }

    /// The document and its passages, in passage order.
    pub async fn passages(
        &self,
        id: &DocumentId,
        user_id: &str,
    ) -> Result<(Document, Vec<Passage>), DocumentError> {
        let document = self.owned(id, user_id).await?;
        let passages = self.store.list_passages(id).await?;
        Ok((document, passages))
    }

    /// Delete a document, its passages and its index entries.
    pub async fn delete(&self, id: &DocumentId, user_id: &str) -> Result<Document, DocumentError> {
        self.owned(id, user_id).await?;
        self.index.remove_document(id).await?;
        let document = self.store.delete_document(id, Actor::user(user_id)).await?;
        info!(document_id = %id, user_id, "Document deleted");
        Ok(document)
    }
}
