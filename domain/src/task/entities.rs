//! Task entity: one agent invocation within a request.

use crate::audit::EventType;
use crate::core::error::DomainError;
use crate::core::ids::{RequestId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Pipeline stage an agent implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Planner,
    Retriever,
    Summarizer,
    Decision,
    Action,
}

impl AgentType {
    pub const ALL: [AgentType; 5] = [
        AgentType::Planner,
        AgentType::Retriever,
        AgentType::Summarizer,
        AgentType::Decision,
        AgentType::Action,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Planner => "planner",
            AgentType::Retriever => "retriever",
            AgentType::Summarizer => "summarizer",
            AgentType::Decision => "decision",
            AgentType::Action => "action",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DomainError::invalid_value("agent_type", s))
    }
}

/// Why a task or request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    InvalidOutput,
    UpstreamUnavailable,
    CitationMismatch,
    Cancelled,
    /// Left in flight by a process that is gone
    Orphaned,
    Internal,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Timeout => "timeout",
            FailureReason::InvalidOutput => "invalid_output",
            FailureReason::UpstreamUnavailable => "upstream_unavailable",
            FailureReason::CitationMismatch => "citation_mismatch",
            FailureReason::Cancelled => "cancelled",
            FailureReason::Orphaned => "orphaned",
            FailureReason::Internal => "internal",
        }
    }

    /// Transient failures are retried with backoff
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FailureReason::Timeout | FailureReason::UpstreamUnavailable
        )
    }

    /// Corrective failures get one re-invocation with a tightened instruction
    pub fn is_correctable(&self) -> bool {
        matches!(
            self,
            FailureReason::InvalidOutput | FailureReason::CitationMismatch
        )
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FailureReason {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "timeout" => Ok(FailureReason::Timeout),
            "invalid_output" => Ok(FailureReason::InvalidOutput),
            "upstream_unavailable" => Ok(FailureReason::UpstreamUnavailable),
            "citation_mismatch" => Ok(FailureReason::CitationMismatch),
            "cancelled" => Ok(FailureReason::Cancelled),
            "orphaned" => Ok(FailureReason::Orphaned),
            "internal" => Ok(FailureReason::Internal),
            other => Err(DomainError::invalid_value("failure_reason", other)),
        }
    }
}

/// Status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "succeeded" => Ok(TaskStatus::Succeeded),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(DomainError::invalid_value("task_status", other)),
        }
    }
}

/// A single agent invocation.
///
/// Exactly one task exists per invocation; retries create a new task with
/// the same `step_index` and a higher `attempt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub request_id: RequestId,
    pub agent_type: AgentType,
    /// Logical step this task belongs to (`None` for planner/action tasks)
    pub step_index: Option<u32>,
    /// 1-based attempt number for the logical invocation
    pub attempt: u32,
    pub input: Value,
    pub output: Option<Value>,
    pub status: TaskStatus,
    pub failure_reason: Option<FailureReason>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// A state change on a [`Task`].
#[derive(Debug, Clone, PartialEq)]
pub enum TaskTransition {
    Start,
    Succeed {
        output: Value,
    },
    Fail {
        reason: FailureReason,
        error: String,
        /// Output kept for diagnostics (e.g. a summary that failed validation)
        output: Option<Value>,
    },
}

impl TaskTransition {
    pub fn event_type(&self) -> EventType {
        match self {
            TaskTransition::Start => EventType::TaskStarted,
            TaskTransition::Succeed { .. } => EventType::TaskSucceeded,
            TaskTransition::Fail { .. } => EventType::TaskFailed,
        }
    }

    fn target(&self) -> TaskStatus {
        match self {
            TaskTransition::Start => TaskStatus::Running,
            TaskTransition::Succeed { .. } => TaskStatus::Succeeded,
            TaskTransition::Fail { .. } => TaskStatus::Failed,
        }
    }
}

impl Task {
    pub fn new(
        request_id: RequestId,
        agent_type: AgentType,
        step_index: Option<u32>,
        attempt: u32,
        input: Value,
    ) -> Self {
        Self {
            id: TaskId::generate(),
            request_id,
            agent_type,
            step_index,
            attempt,
            input,
            output: None,
            status: TaskStatus::Pending,
            failure_reason: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Apply a transition, returning the new state.
    ///
    /// Legal moves: pending → running, running → succeeded | failed, and
    /// pending → failed (a task abandoned before dispatch).
    pub fn apply(&self, transition: &TaskTransition, now: DateTime<Utc>) -> Result<Task, DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::AlreadyTerminal {
                entity: "task",
                status: self.status.to_string(),
            });
        }

        let target = transition.target();
        let legal = matches!(
            (self.status, target),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Succeeded)
                | (TaskStatus::Running, TaskStatus::Failed)
                | (TaskStatus::Pending, TaskStatus::Failed)
        );
        if !legal {
            return Err(DomainError::invalid_transition("task", self.status, target));
        }

        let mut next = self.clone();
        next.status = target;
        match transition {
            TaskTransition::Start => next.started_at = Some(now),
            TaskTransition::Succeed { output } => {
                next.output = Some(output.clone());
                next.finished_at = Some(now);
            }
            TaskTransition::Fail {
                reason,
                error,
                output,
            } => {
                next.failure_reason = Some(*reason);
                next.error = Some(error.clone());
                if output.is_some() {
                    next.output = output.clone();
                }
                next.finished_at = Some(now);
            }
        }
        Ok(next)
    }
}
