//! Agent implementations
//!
//! One module per pipeline stage. Each agent implements the
//! [`Agent`](attest_application::Agent) port and is registered by
//! [`AgentType`](attest_domain::AgentType) in the composition root.

pub mod action;
pub mod decision;
pub mod planner;
pub mod prompts;
pub mod retriever;
pub mod summarizer;

#[cfg(test)]
pub(crate) mod testing;

pub use action::ConnectorActionAgent;
pub use decision::{LlmDecision, RuleBasedDecision};
pub use planner::LlmPlanner;
pub use retriever::FusionRetriever;
pub use summarizer::LlmSummarizer;
