//! Persistent store port
//!
//! Durable records for documents, passages, requests, tasks and pending
//! actions. Every mutating method writes the state row and the audit event
//! describing it in one transaction, so the ledger order within a request
//! always matches the causal order of its transitions.

use async_trait::async_trait;
use attest_domain::{
    ActionId, ActionStatus, ActionTransition, Actor, Document, DocumentId, DomainError, Passage,
    PassageId, PendingAction, Request, RequestId, RequestTransition, Task, TaskId, TaskTransition,
};
use serde_json::Value;
use thiserror::Error;

/// Errors raised by store adapters
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Compare-and-swap lost: the row no longer has the expected status
    #[error("{entity} {id} is {actual}, expected {expected}")]
    Conflict {
        entity: &'static str,
        id: String,
        expected: String,
        actual: String,
    },

    #[error("{0}")]
    Transition(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// The entity was already terminal when the transition was attempted.
    pub fn is_already_terminal(&self) -> bool {
        matches!(
            self,
            StoreError::Transition(DomainError::AlreadyTerminal { .. })
        )
    }
}

/// Which pending actions to list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionQuery {
    pub status: Option<ActionStatus>,
    /// Only actions of requests submitted by this user
    pub request_owner: Option<String>,
    pub request_id: Option<RequestId>,
}

impl ActionQuery {
    pub fn pending() -> Self {
        Self::with_status(ActionStatus::Pending)
    }

    pub fn with_status(status: ActionStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn owned_by(mut self, user_id: impl Into<String>) -> Self {
        self.request_owner = Some(user_id.into());
        self
    }

    pub fn for_request(request_id: RequestId) -> Self {
        Self {
            request_id: Some(request_id),
            ..Default::default()
        }
    }
}

/// Durable state of the engine.
///
/// Results of `list_*` methods are deterministically ordered: passages by
/// `(doc_id, index)`, tasks and actions in insertion order.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    // ==================== Documents ====================

    /// Persist a document and its passages (`document_ingested`).
    async fn insert_document(
        &self,
        document: &Document,
        passages: &[Passage],
        actor: Actor,
    ) -> Result<(), StoreError>;

    async fn get_document(&self, id: &DocumentId) -> Result<Option<Document>, StoreError>;

    async fn list_passages(&self, doc_id: &DocumentId) -> Result<Vec<Passage>, StoreError>;

    /// Fetch passages by id, in the order requested. Unknown ids are skipped.
    async fn get_passages(&self, ids: &[PassageId]) -> Result<Vec<Passage>, StoreError>;

    /// Delete a document and its passages (`document_deleted`).
    async fn delete_document(&self, id: &DocumentId, actor: Actor) -> Result<Document, StoreError>;

    // ==================== Requests ====================

    /// Persist a new request (`request_created`).
    async fn insert_request(&self, request: &Request, actor: Actor) -> Result<(), StoreError>;

    /// Apply a transition to the current row and record it.
    async fn transition_request(
        &self,
        id: &RequestId,
        transition: RequestTransition,
        actor: Actor,
    ) -> Result<Request, StoreError>;

    async fn get_request(&self, id: &RequestId) -> Result<Option<Request>, StoreError>;

    /// Requests not yet completed or failed.
    async fn list_active_requests(&self) -> Result<Vec<Request>, StoreError>;

    // ==================== Tasks ====================

    /// Persist a new task (`task_created`).
    async fn insert_task(&self, task: &Task, actor: Actor) -> Result<(), StoreError>;

    async fn transition_task(
        &self,
        id: &TaskId,
        transition: TaskTransition,
        actor: Actor,
    ) -> Result<Task, StoreError>;

    async fn list_tasks(&self, request_id: &RequestId) -> Result<Vec<Task>, StoreError>;

    // ==================== Pending actions ====================

    /// Persist proposed actions (`action_proposed` each).
    async fn insert_actions(&self, actions: &[PendingAction], actor: Actor)
    -> Result<(), StoreError>;

    /// Compare-and-swap transition: only applied if the current status still
    /// equals `expected`, otherwise [`StoreError::Conflict`].
    ///
    /// `extra` is merged into the audit event details.
    async fn transition_action(
        &self,
        id: &ActionId,
        expected: ActionStatus,
        transition: ActionTransition,
        actor: Actor,
        extra: Option<Value>,
    ) -> Result<PendingAction, StoreError>;

    async fn get_action(&self, id: &ActionId) -> Result<Option<PendingAction>, StoreError>;

    async fn list_actions(&self, query: &ActionQuery) -> Result<Vec<PendingAction>, StoreError>;
}
