//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.
//! Conversions into application config types live next to each section.

mod pipeline;
mod services;
mod storage;

pub use pipeline::{FileFabricConfig, FileOrchestratorConfig, FileRetryConfig};
pub use services::{FileCollaboratorsConfig, FileConnectorsConfig};
pub use storage::{FileApprovalConfig, FileLoggingConfig, FileStoreConfig};

use attest_application::OrchestratorConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors
#[derive(Debug, Error, PartialEq)]
pub enum ConfigValidationError {
    #[error("orchestrator.agent_timeout_secs cannot be 0")]
    InvalidAgentTimeout,

    #[error("orchestrator.top_n cannot be 0")]
    InvalidTopN,

    #[error("orchestrator.rrf_k cannot be 0")]
    InvalidRrfK,

    #[error("orchestrator.citation_policy: {0}")]
    InvalidCitationPolicy(String),

    #[error("orchestrator.decision must be \"rules\" or \"llm\", got \"{0}\"")]
    InvalidDecision(String),

    #[error("retry.max_attempts cannot be 0")]
    InvalidMaxAttempts,

    #[error("retry.multiplier must be at least 1.0, got {0}")]
    InvalidMultiplier(f64),

    #[error("fabric.workers_per_agent cannot be 0")]
    InvalidWorkers,

    #[error("fabric.queue_capacity cannot be 0")]
    InvalidQueueCapacity,

    #[error("collaborators.request_timeout_secs cannot be 0")]
    InvalidRequestTimeout,

    #[error("connectors.{0}: webhook URL cannot be empty")]
    EmptyConnectorUrl(String),
}

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Persistent store settings
    pub store: FileStoreConfig,
    /// Request pipeline settings
    pub orchestrator: FileOrchestratorConfig,
    /// Backoff for transient agent failures
    pub retry: FileRetryConfig,
    /// Worker pool sizing
    pub fabric: FileFabricConfig,
    /// External service endpoints
    pub collaborators: FileCollaboratorsConfig,
    /// Per-service webhook URLs for approved actions
    pub connectors: FileConnectorsConfig,
    /// Who may resolve pending actions besides their owner
    pub approval: FileApprovalConfig,
    /// Log file output
    pub logging: FileLoggingConfig,
}

impl FileConfig {
    /// Validate the entire configuration, stopping at the first problem.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        self.orchestrator.validate()?;
        self.retry.validate()?;
        self.fabric.validate()?;
        self.collaborators.validate()?;
        self.connectors.validate()
    }

    /// Orchestrator parameters including the retry policy.
    pub fn orchestrator_config(&self) -> Result<OrchestratorConfig, ConfigValidationError> {
        self.validate()?;
        Ok(self
            .orchestrator
            .to_orchestrator_config()?
            .with_retry(self.retry.to_retry_policy()))
    }
}
