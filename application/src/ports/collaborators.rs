//! External collaborator ports
//!
//! Narrow request/response contracts for the services the engine depends on
//! but does not implement: text extraction, embeddings, the retrieval index,
//! the LLM, and the outbound action connectors.

use crate::ports::agent::AgentError;
use async_trait::async_trait;
use attest_domain::{DocumentId, PassageCandidate, PassageId, RankedCandidate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur when calling a collaborator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rejected: {0}")]
    Rejected(String),
}

impl From<CollaboratorError> for AgentError {
    fn from(err: CollaboratorError) -> Self {
        match err {
            CollaboratorError::Timeout => AgentError::Timeout,
            CollaboratorError::Unavailable(m) => AgentError::UpstreamUnavailable(m),
            CollaboratorError::InvalidResponse(m) | CollaboratorError::Rejected(m) => {
                AgentError::InvalidOutput(m)
            }
        }
    }
}

/// Extracts passage candidates from a document blob.
#[async_trait]
pub trait IngestionClient: Send + Sync {
    async fn extract(
        &self,
        blob: &[u8],
        filename: &str,
        content_type: &str,
    ) -> Result<Vec<PassageCandidate>, CollaboratorError>;
}

/// Turns texts into fixed-dimension vectors, in input order.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CollaboratorError>;
}

/// One passage as stored in the retrieval index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub passage_id: PassageId,
    pub doc_id: DocumentId,
    pub owner: String,
    pub page: Option<u32>,
    pub text: String,
    pub vector: Vec<f32>,
}

/// A hybrid search over the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexQuery {
    pub vector: Vec<f32>,
    pub text: String,
    /// Restrict results to documents owned by this user
    pub owner: String,
    pub limit: usize,
}

/// Ranked candidates per source, best first.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IndexResults {
    #[serde(default)]
    pub vector: Vec<RankedCandidate>,
    #[serde(default)]
    pub lexical: Vec<RankedCandidate>,
}

/// Vector + lexical index over passages.
#[async_trait]
pub trait RetrievalIndex: Send + Sync {
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<(), CollaboratorError>;

    async fn search(&self, query: IndexQuery) -> Result<IndexResults, CollaboratorError>;

    async fn remove_document(&self, doc_id: &DocumentId) -> Result<(), CollaboratorError>;
}

/// A structured prompt for the LLM collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmPrompt {
    pub system: String,
    pub user: String,
    /// Ask for a JSON object response
    #[serde(default)]
    pub json: bool,
}

impl LlmPrompt {
    pub fn json(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            json: true,
        }
    }
}

/// Untrusted text generator.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &LlmPrompt) -> Result<String, CollaboratorError>;
}

/// Executes approved actions against one external service.
#[async_trait]
pub trait ActionConnector: Send + Sync {
    /// Target service names this connector serves, e.g. `jira`
    fn services(&self) -> Vec<String>;

    async fn execute(&self, action_type: &str, payload: &Value) -> Result<Value, CollaboratorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collaborator_error_maps_to_agent_error() {
        assert_eq!(AgentError::from(CollaboratorError::Timeout), AgentError::Timeout);
        assert_eq!(
            AgentError::from(CollaboratorError::Unavailable("refused".into())),
            AgentError::UpstreamUnavailable("refused".into())
        );
        assert_eq!(
            AgentError::from(CollaboratorError::InvalidResponse("bad json".into())),
            AgentError::InvalidOutput("bad json".into())
        );
    }
}
