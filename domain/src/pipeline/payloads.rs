//! Typed stage payloads exchanged with agents.
//!
//! Every stage has an input and an output struct; [`AgentInput`] and
//! [`AgentOutput`] wrap them so the registry can hold one trait object type
//! for every stage.

use crate::action::ProposedAction;
use crate::core::ids::{ActionId, PassageId};
use crate::document::Passage;
use crate::retrieval::RankedPassage;
use crate::task::AgentType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One logical step produced by the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub retrieval_query: String,
    pub goal: String,
    /// The step does not depend on earlier summaries
    #[serde(default)]
    pub independent: bool,
}

impl PlanStep {
    pub fn new(retrieval_query: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            retrieval_query: retrieval_query.into(),
            goal: goal.into(),
            independent: false,
        }
    }

    pub fn independent(mut self) -> Self {
        self.independent = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerInput {
    pub query: String,
    pub user_id: String,
    /// Tightened instruction for a corrective re-invocation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerOutput {
    pub steps: Vec<PlanStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieverInput {
    pub query: String,
    /// Only passages of documents owned by this user are retrieved
    pub user_id: String,
    pub top_n: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieverOutput {
    pub passages: Vec<RankedPassage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarizerInput {
    pub query: String,
    pub goal: String,
    /// Exactly the passage set the retriever returned, in ranked order
    pub passages: Vec<Passage>,
    /// Earlier step summaries, for dependent steps
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prior_summaries: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction: Option<String>,
}

impl SummarizerInput {
    pub fn allowed_passage_ids(&self) -> Vec<PassageId> {
        self.passages.iter().map(|p| p.id.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarizerOutput {
    pub summary_text: String,
    /// Citation tokens in `[cite:doc|page|passage]` form
    #[serde(default)]
    pub citations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionInput {
    pub query: String,
    pub goal: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionOutput {
    #[serde(default)]
    pub actions: Vec<ProposedAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionInput {
    pub action_id: ActionId,
    pub action_type: String,
    pub target_service: String,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutput {
    /// Connector-reported status, e.g. `created` or `sent`
    pub status: String,
    #[serde(default)]
    pub result: Value,
}

const FAILURE_STATUSES: [&str; 5] = ["failed", "failure", "error", "rejected", "execution_failed"];

impl ActionOutput {
    /// Whether the connector reported that the action did not take effect.
    pub fn is_failure(&self) -> bool {
        let status = self.status.trim().to_ascii_lowercase();
        FAILURE_STATUSES.contains(&status.as_str())
    }

    /// Error text for a failed action: the reply's `error` or `message`
    /// field, else the status itself.
    pub fn failure_message(&self) -> String {
        ["error", "message"]
            .iter()
            .find_map(|key| self.result.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| format!("connector reported status '{}'", self.status))
    }

    /// The connector reply with `status` beside its own fields.
    ///
    /// Object replies keep their shape; any other reply is kept under
    /// `response`.
    pub fn into_record(self) -> Value {
        match self.result {
            Value::Object(mut fields) => {
                fields
                    .entry("status")
                    .or_insert_with(|| Value::String(self.status));
                Value::Object(fields)
            }
            Value::Null => serde_json::json!({ "status": self.status }),
            other => serde_json::json!({ "status": self.status, "response": other }),
        }
    }
}

/// Input to any agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum AgentInput {
    Planner(PlannerInput),
    Retriever(RetrieverInput),
    Summarizer(SummarizerInput),
    Decision(DecisionInput),
    Action(ActionInput),
}

impl AgentInput {
    pub fn agent_type(&self) -> AgentType {
        match self {
            AgentInput::Planner(_) => AgentType::Planner,
            AgentInput::Retriever(_) => AgentType::Retriever,
            AgentInput::Summarizer(_) => AgentType::Summarizer,
            AgentInput::Decision(_) => AgentType::Decision,
            AgentInput::Action(_) => AgentType::Action,
        }
    }

    /// Attach a corrective instruction, for the stages that accept one.
    pub fn with_correction(self, instruction: impl Into<String>) -> Self {
        let instruction = Some(instruction.into());
        match self {
            AgentInput::Planner(mut i) => {
                i.correction = instruction;
                AgentInput::Planner(i)
            }
            AgentInput::Summarizer(mut i) => {
                i.correction = instruction;
                AgentInput::Summarizer(i)
            }
            AgentInput::Decision(mut i) => {
                i.correction = instruction;
                AgentInput::Decision(i)
            }
            other => other,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Output of any agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum AgentOutput {
    Planner(PlannerOutput),
    Retriever(RetrieverOutput),
    Summarizer(SummarizerOutput),
    Decision(DecisionOutput),
    Action(ActionOutput),
}

impl AgentOutput {
    pub fn agent_type(&self) -> AgentType {
        match self {
            AgentOutput::Planner(_) => AgentType::Planner,
            AgentOutput::Retriever(_) => AgentType::Retriever,
            AgentOutput::Summarizer(_) => AgentType::Summarizer,
            AgentOutput::Decision(_) => AgentType::Decision,
            AgentOutput::Action(_) => AgentType::Action,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
