//! Agent port
//!
//! Every pipeline stage implements [`Agent`]. The orchestrator only ever
//! looks agents up by [`AgentType`] in an [`AgentRegistry`]; it never
//! branches on a concrete implementation.

use async_trait::async_trait;
use attest_domain::{AgentInput, AgentOutput, AgentType, FailureReason};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Typed failure of one agent call.
///
/// Agents never retry on their own; retry policy belongs to the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error("Agent timed out")]
    Timeout,

    #[error("Invalid agent output: {0}")]
    InvalidOutput(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl AgentError {
    pub fn reason(&self) -> FailureReason {
        match self {
            AgentError::Timeout => FailureReason::Timeout,
            AgentError::InvalidOutput(_) => FailureReason::InvalidOutput,
            AgentError::UpstreamUnavailable(_) => FailureReason::UpstreamUnavailable,
        }
    }

    pub fn invalid_output(message: impl Into<String>) -> Self {
        AgentError::InvalidOutput(message.into())
    }

    /// Error for an input that does not belong to this agent's stage.
    pub fn wrong_stage(expected: AgentType, input: &AgentInput) -> Self {
        AgentError::InvalidOutput(format!(
            "{} agent received {} input",
            expected,
            input.agent_type()
        ))
    }
}

/// Uniform contract of a pipeline stage.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stage this agent serves
    fn agent_type(&self) -> AgentType;

    /// Name recorded as the audit actor
    fn name(&self) -> String {
        self.agent_type().as_str().to_string()
    }

    async fn execute(&self, input: AgentInput) -> Result<AgentOutput, AgentError>;
}

/// Registry mapping each stage to its implementation.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: HashMap<AgentType, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent under its own stage, replacing any previous one.
    pub fn register(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agents.insert(agent.agent_type(), agent);
        self
    }

    pub fn get(&self, agent_type: AgentType) -> Option<Arc<dyn Agent>> {
        self.agents.get(&agent_type).cloned()
    }

    /// Stages without an implementation.
    pub fn missing(&self) -> Vec<AgentType> {
        AgentType::ALL
            .into_iter()
            .filter(|t| !self.agents.contains_key(t))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AgentType, &Arc<dyn Agent>)> {
        self.agents.iter()
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut registered: Vec<_> = self.agents.keys().map(|t| t.as_str()).collect();
        registered.sort();
        f.debug_struct("AgentRegistry")
            .field("agents", &registered)
            .finish()
    }
}
