//! Decision agents.
//!
//! - [`RuleBasedDecision`]: keyword rules on the query, first match wins
//! - [`LlmDecision`]: asks the LLM for proposals
//!
//! Neither agent executes anything; proposals become pending actions that
//! wait for a human.

use super::prompts::{StagePrompts, parse_reply};
use async_trait::async_trait;
use attest_application::{Agent, AgentError, LlmClient};
use attest_domain::{
    AgentInput, AgentOutput, AgentType, DecisionInput, DecisionOutput, ProposedAction,
};
use regex::Regex;
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// Confidence attached to keyword-rule proposals.
const RULE_CONFIDENCE: f64 = 0.6;

struct Rule {
    pattern: Regex,
    action_type: &'static str,
    target_service: &'static str,
    label: &'static str,
}

/// Keyword rules mapping query wording to a proposed action.
pub struct RuleBasedDecision {
    rules: Vec<Rule>,
    alert_recipient: Option<String>,
}

impl RuleBasedDecision {
    pub fn new() -> Result<Self, regex::Error> {
        let rules = vec![
            Rule {
                pattern: Regex::new(r"(?i)\b(ticket|incident)s?\b")?,
                action_type: "create_ticket",
                target_service: "jira",
                label: "Create JIRA ticket",
            },
            Rule {
                pattern: Regex::new(r"(?i)\b(e-?mail|alert)s?\b")?,
                action_type: "send_alert",
                target_service: "email",
                label: "Send email alert",
            },
        ];
        Ok(Self {
            rules,
            alert_recipient: None,
        })
    }

    /// Default recipient for email alerts.
    pub fn with_alert_recipient(mut self, recipient: Option<String>) -> Self {
        self.alert_recipient = recipient;
        self
    }

    fn decide(&self, input: &DecisionInput) -> DecisionOutput {
        let Some(rule) = self.rules.iter().find(|r| r.pattern.is_match(&input.query)) else {
            return DecisionOutput {
                actions: Vec::new(),
            };
        };

        let mut payload = Map::new();
        payload.insert(
            "description".into(),
            Value::from(format!("{}: '{}'", rule.label, input.query)),
        );
        payload.insert("summary".into(), Value::from(input.summary.clone()));
        match rule.target_service {
            "jira" => {
                payload.insert("priority".into(), json!("high"));
            }
            _ => {
                if let Some(recipient) = &self.alert_recipient {
                    payload.insert("recipient".into(), Value::from(recipient.clone()));
                }
            }
        }

        DecisionOutput {
            actions: vec![
                ProposedAction::new(rule.action_type, rule.target_service, Value::Object(payload))
                    .with_confidence(RULE_CONFIDENCE),
            ],
        }
    }
}

#[async_trait]
impl Agent for RuleBasedDecision {
    fn agent_type(&self) -> AgentType {
        AgentType::Decision
    }

    async fn execute(&self, input: AgentInput) -> Result<AgentOutput, AgentError> {
        match input {
            AgentInput::Decision(input) => Ok(AgentOutput::Decision(self.decide(&input))),
            other => Err(AgentError::wrong_stage(AgentType::Decision, &other)),
        }
    }
}

/// Proposals from the LLM.
pub struct LlmDecision {
    llm: Arc<dyn LlmClient>,
}

impl LlmDecision {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Agent for LlmDecision {
    fn agent_type(&self) -> AgentType {
        AgentType::Decision
    }

    async fn execute(&self, input: AgentInput) -> Result<AgentOutput, AgentError> {
        let input = match input {
            AgentInput::Decision(input) => input,
            other => return Err(AgentError::wrong_stage(AgentType::Decision, &other)),
        };
        let reply = self.llm.complete(&StagePrompts::decision(&input)).await?;
        let output: DecisionOutput = parse_reply(&reply)?;
        if let Some(bad) = output
            .actions
            .iter()
            .find(|a| !(0.0..=1.0).contains(&a.confidence))
        {
            return Err(AgentError::invalid_output(format!(
                "confidence {} outside [0, 1]",
                bad.confidence
            )));
        }
        Ok(AgentOutput::Decision(output))
    }
}
