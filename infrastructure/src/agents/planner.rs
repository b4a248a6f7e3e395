//! LLM-backed planner.

use super::prompts::{StagePrompts, parse_reply};
use async_trait::async_trait;
use attest_application::{Agent, AgentError, LlmClient};
use attest_domain::{AgentInput, AgentOutput, AgentType, PlannerOutput};
use std::sync::Arc;
use tracing::debug;

pub struct LlmPlanner {
    llm: Arc<dyn LlmClient>,
}

impl LlmPlanner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Agent for LlmPlanner {
    fn agent_type(&self) -> AgentType {
        AgentType::Planner
    }

    async fn execute(&self, input: AgentInput) -> Result<AgentOutput, AgentError> {
        let input = match input {
            AgentInput::Planner(input) => input,
            other => return Err(AgentError::wrong_stage(AgentType::Planner, &other)),
        };
        let reply = self.llm.complete(&StagePrompts::planner(&input)).await?;
        let output: PlannerOutput = parse_reply(&reply)?;
        debug!(steps = output.steps.len(), "Plan parsed");
        Ok(AgentOutput::Planner(output))
    }
}
