//! Pipeline configuration from TOML (`[orchestrator]`, `[retry]`, `[fabric]`)

use super::ConfigValidationError;
use attest_application::{CitationPolicy, FabricConfig, OrchestratorConfig, RetryPolicy};
use attest_domain::retrieval::DEFAULT_RRF_K;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raw orchestrator configuration from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOrchestratorConfig {
    /// Bound on every agent call, in seconds
    pub agent_timeout_secs: u64,
    /// Passages kept after fusion
    pub top_n: usize,
    /// Reciprocal rank fusion constant
    pub rrf_k: u32,
    /// "degrade" or "fail"
    pub citation_policy: String,
    pub parallel_independent_steps: bool,
    /// Decision agent: "rules" (keyword rules) or "llm"
    pub decision: String,
}

impl Default for FileOrchestratorConfig {
    fn default() -> Self {
        Self {
            agent_timeout_secs: 60,
            top_n: 5,
            rrf_k: DEFAULT_RRF_K,
            citation_policy: CitationPolicy::default().as_str().to_string(),
            parallel_independent_steps: false,
            decision: "rules".to_string(),
        }
    }
}

impl FileOrchestratorConfig {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.agent_timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidAgentTimeout);
        }
        if self.top_n == 0 {
            return Err(ConfigValidationError::InvalidTopN);
        }
        if self.rrf_k == 0 {
            return Err(ConfigValidationError::InvalidRrfK);
        }
        self.citation_policy()?;
        match self.decision.as_str() {
            "rules" | "llm" => Ok(()),
            other => Err(ConfigValidationError::InvalidDecision(other.to_string())),
        }
    }

    /// Whether proposals come from the LLM rather than keyword rules
    pub fn llm_decision(&self) -> bool {
        self.decision == "llm"
    }

    pub fn citation_policy(&self) -> Result<CitationPolicy, ConfigValidationError> {
        self.citation_policy
            .parse()
            .map_err(ConfigValidationError::InvalidCitationPolicy)
    }

    /// Orchestrator parameters with the default retry policy.
    pub fn to_orchestrator_config(&self) -> Result<OrchestratorConfig, ConfigValidationError> {
        Ok(OrchestratorConfig::default()
            .with_agent_timeout(Duration::from_secs(self.agent_timeout_secs))
            .with_top_n(self.top_n)
            .with_citation_policy(self.citation_policy()?)
            .with_parallel_independent_steps(self.parallel_independent_steps))
    }
}

/// Raw retry configuration from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileRetryConfig {
    /// Attempts per logical step, including the first
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for FileRetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
            multiplier: policy.multiplier,
        }
    }
}

impl FileRetryConfig {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.max_attempts == 0 {
            return Err(ConfigValidationError::InvalidMaxAttempts);
        }
        if self.multiplier < 1.0 {
            return Err(ConfigValidationError::InvalidMultiplier(self.multiplier));
        }
        Ok(())
    }

    pub fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(self.max_attempts)
            .with_initial_backoff(Duration::from_millis(self.initial_backoff_ms))
            .with_max_backoff(Duration::from_millis(self.max_backoff_ms))
            .with_multiplier(self.multiplier)
    }
}

/// Raw task fabric configuration from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileFabricConfig {
    pub workers_per_agent: usize,
    pub queue_capacity: usize,
}

impl Default for FileFabricConfig {
    fn default() -> Self {
        let fabric = FabricConfig::default();
        Self {
            workers_per_agent: fabric.workers_per_agent,
            queue_capacity: fabric.queue_capacity,
        }
    }
}

impl FileFabricConfig {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.workers_per_agent == 0 {
            return Err(ConfigValidationError::InvalidWorkers);
        }
        if self.queue_capacity == 0 {
            return Err(ConfigValidationError::InvalidQueueCapacity);
        }
        Ok(())
    }

    pub fn to_fabric_config(&self) -> FabricConfig {
        FabricConfig::default()
            .with_workers_per_agent(self.workers_per_agent)
            .with_queue_capacity(self.queue_capacity)
    }
}
