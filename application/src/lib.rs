//! Application layer for attest
//!
//! This crate contains use cases, port definitions, the task fabric and
//! application configuration. It depends only on the domain layer.

pub mod config;
pub mod fabric;
pub mod ports;
pub mod use_cases;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::{CitationPolicy, FabricConfig, OrchestratorConfig, RetryPolicy};
pub use fabric::{FabricError, TaskFabric};
pub use ports::{
    agent::{Agent, AgentError, AgentRegistry},
    approvers::{ApproverDirectory, StaticApprovers},
    collaborators::{
        ActionConnector, CollaboratorError, EmbeddingClient, IndexEntry, IndexQuery,
        IndexResults, IngestionClient, LlmClient, LlmPrompt, RetrievalIndex,
    },
    ledger::AuditLedger,
    progress::{NoProgress, PipelineProgress},
    store::{ActionQuery, PersistentStore, StoreError},
};
pub use use_cases::approval::{ActorSignature, ApprovalError, ApprovalGate};
pub use use_cases::audit::{AuditError, AuditUseCase, RequestDetails};
pub use use_cases::documents::{DocumentError, DocumentsUseCase};
pub use use_cases::ingest_document::{
    IngestDocumentUseCase, IngestError, IngestInput, IngestOutput,
};
pub use use_cases::orchestrator::{
    OrchestratorError, QueryResponse, RecoveryReport, RequestHandles, RequestOrchestrator,
    SubmitQueryInput,
};
