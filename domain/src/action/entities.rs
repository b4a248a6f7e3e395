//! Pending action entity and its approval lifecycle.

use crate::audit::EventType;
use crate::core::error::DomainError;
use crate::core::ids::{ActionId, RequestId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Status of a pending action.
///
/// The lifecycle is strictly one-directional:
///
/// ```text
/// pending ──approve──▶ approved ──▶ executed
///    │                     └──────▶ execution_failed
///    └──reject───▶ rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Executed,
    ExecutionFailed,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Approved => "approved",
            ActionStatus::Rejected => "rejected",
            ActionStatus::Executed => "executed",
            ActionStatus::ExecutionFailed => "execution_failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionStatus::Rejected | ActionStatus::Executed | ActionStatus::ExecutionFailed
        )
    }

    /// Whether `self → next` is an edge of the lifecycle graph.
    pub fn can_transition_to(&self, next: ActionStatus) -> bool {
        matches!(
            (self, next),
            (ActionStatus::Pending, ActionStatus::Approved)
                | (ActionStatus::Pending, ActionStatus::Rejected)
                | (ActionStatus::Approved, ActionStatus::Executed)
                | (ActionStatus::Approved, ActionStatus::ExecutionFailed)
        )
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ActionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ActionStatus::Pending),
            "approved" => Ok(ActionStatus::Approved),
            "rejected" => Ok(ActionStatus::Rejected),
            "executed" => Ok(ActionStatus::Executed),
            "execution_failed" => Ok(ActionStatus::ExecutionFailed),
            other => Err(DomainError::invalid_value("action_status", other)),
        }
    }
}

/// An action proposed by the decision stage, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedAction {
    pub action_type: String,
    pub target_service: String,
    pub payload: Value,
    #[serde(default)]
    pub confidence: f64,
}

impl ProposedAction {
    pub fn new(
        action_type: impl Into<String>,
        target_service: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            action_type: action_type.into(),
            target_service: target_service.into(),
            payload,
            confidence: 1.0,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}

/// A side-effecting operation awaiting (or past) human approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: ActionId,
    pub request_id: RequestId,
    pub action_type: String,
    pub target_service: String,
    pub payload: Value,
    pub confidence: f64,
    pub status: ActionStatus,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    /// Execution result, or the error when execution failed
    pub result: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// A state change on a [`PendingAction`].
#[derive(Debug, Clone, PartialEq)]
pub enum ActionTransition {
    Approve { by: String },
    Reject { by: String },
    MarkExecuted { result: Value },
    MarkExecutionFailed { error: String },
}

impl ActionTransition {
    pub fn target(&self) -> ActionStatus {
        match self {
            ActionTransition::Approve { .. } => ActionStatus::Approved,
            ActionTransition::Reject { .. } => ActionStatus::Rejected,
            ActionTransition::MarkExecuted { .. } => ActionStatus::Executed,
            ActionTransition::MarkExecutionFailed { .. } => ActionStatus::ExecutionFailed,
        }
    }

    pub fn event_type(&self) -> EventType {
        match self {
            ActionTransition::Approve { .. } => EventType::ActionApproved,
            ActionTransition::Reject { .. } => EventType::ActionRejected,
            ActionTransition::MarkExecuted { .. } => EventType::ActionExecuted,
            ActionTransition::MarkExecutionFailed { .. } => EventType::ActionExecutionFailed,
        }
    }
}

impl PendingAction {
    pub fn propose(request_id: RequestId, proposed: ProposedAction) -> Self {
        Self {
            id: ActionId::generate(),
            request_id,
            action_type: proposed.action_type,
            target_service: proposed.target_service,
            payload: proposed.payload,
            confidence: proposed.confidence,
            status: ActionStatus::Pending,
            approved_by: None,
            approved_at: None,
            executed_at: None,
            result: None,
            created_at: Utc::now(),
        }
    }

    /// Apply a transition, returning the new state.
    ///
    /// Fails if the transition is not an edge from the current status; in
    /// particular `pending → executed` is unreachable.
    pub fn apply(
        &self,
        transition: &ActionTransition,
        now: DateTime<Utc>,
    ) -> Result<PendingAction, DomainError> {
        let target = transition.target();
        if !self.status.can_transition_to(target) {
            return Err(DomainError::invalid_transition(
                "pending_action",
                self.status,
                target,
            ));
        }

        let mut next = self.clone();
        next.status = target;
        match transition {
            ActionTransition::Approve { by } | ActionTransition::Reject { by } => {
                next.approved_by = Some(by.clone());
                next.approved_at = Some(now);
            }
            ActionTransition::MarkExecuted { result } => {
                next.executed_at = Some(now);
                next.result = Some(result.clone());
            }
            ActionTransition::MarkExecutionFailed { error } => {
                next.executed_at = Some(now);
                next.result = Some(serde_json::json!({ "error": error }));
            }
        }
        Ok(next)
    }
}
