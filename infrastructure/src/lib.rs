//! Infrastructure layer for attest
//!
//! This crate contains adapters that implement the ports defined
//! in the application layer: the SQLite store and audit ledger, HTTP
//! collaborator clients, the stage agents, outbound action connectors,
//! and configuration file loading.

pub mod agents;
pub mod collaborators;
pub mod config;
pub mod connectors;
pub mod store;

// Re-export commonly used types
pub use agents::{
    ConnectorActionAgent, FusionRetriever, LlmDecision, LlmPlanner, LlmSummarizer,
    RuleBasedDecision,
};
pub use collaborators::{
    HttpEmbeddingClient, HttpIngestionClient, HttpLlmClient, HttpRetrievalIndex, HttpService,
    MemoryIndex, PlainTextIngestion,
};
pub use config::{ConfigLoader, ConfigValidationError, FileConfig};
pub use connectors::WebhookConnector;
pub use store::SqliteStore;
