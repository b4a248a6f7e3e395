//! LLM-backed summarizer.
//!
//! The reply is untrusted: citation validation happens in the orchestrator,
//! not here. When the model lists no citations explicitly, the inline
//! tokens of the summary text are used instead.

use super::prompts::{StagePrompts, parse_reply};
use async_trait::async_trait;
use attest_application::{Agent, AgentError, LlmClient};
use attest_domain::citation::extract_inline;
use attest_domain::{AgentInput, AgentOutput, AgentType, SummarizerOutput};
use std::sync::Arc;

pub struct LlmSummarizer {
    llm: Arc<dyn LlmClient>,
}

impl LlmSummarizer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Agent for LlmSummarizer {
    fn agent_type(&self) -> AgentType {
        AgentType::Summarizer
    }

    async fn execute(&self, input: AgentInput) -> Result<AgentOutput, AgentError> {
        let input = match input {
            AgentInput::Summarizer(input) => input,
            other => return Err(AgentError::wrong_stage(AgentType::Summarizer, &other)),
        };
        if input.passages.is_empty() {
            return Ok(AgentOutput::Summarizer(SummarizerOutput {
                summary_text: "No relevant passages were found.".to_string(),
                citations: Vec::new(),
            }));
        }

        let reply = self.llm.complete(&StagePrompts::summarizer(&input)).await?;
        let mut output: SummarizerOutput = parse_reply(&reply)?;
        if output.summary_text.trim().is_empty() {
            return Err(AgentError::invalid_output("empty summary_text"));
        }
        if output.citations.is_empty() {
            output.citations = extract_inline(&output.summary_text);
        }
        Ok(AgentOutput::Summarizer(output))
    }
}
