//! Request entity: one user query and the pipeline state driving it.

use crate::audit::EventType;
use crate::citation::Citation;
use crate::core::error::DomainError;
use crate::core::ids::{ActionId, RequestId, TaskId};
use crate::pipeline::StepResult;
use crate::task::{AgentType, FailureReason};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Coarse status exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Running => "running",
            RequestStatus::Completed => "completed",
            RequestStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Failed)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "running" => Ok(RequestStatus::Running),
            "completed" => Ok(RequestStatus::Completed),
            "failed" => Ok(RequestStatus::Failed),
            other => Err(DomainError::invalid_value("request_status", other)),
        }
    }
}

/// Fine-grained orchestration phase.
///
/// ```text
/// created → planning → {retrieving → summarizing → deciding → acting}* → finalizing → completed
///     └────────────┴──────────────────── any non-terminal ─────────────────────────→ failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RequestPhase {
    #[default]
    Created,
    Planning,
    Retrieving,
    Summarizing,
    Deciding,
    Acting,
    Finalizing,
    Completed,
    Failed,
}

impl RequestPhase {
    pub const ALL: [RequestPhase; 9] = [
        RequestPhase::Created,
        RequestPhase::Planning,
        RequestPhase::Retrieving,
        RequestPhase::Summarizing,
        RequestPhase::Deciding,
        RequestPhase::Acting,
        RequestPhase::Finalizing,
        RequestPhase::Completed,
        RequestPhase::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestPhase::Created => "created",
            RequestPhase::Planning => "planning",
            RequestPhase::Retrieving => "retrieving",
            RequestPhase::Summarizing => "summarizing",
            RequestPhase::Deciding => "deciding",
            RequestPhase::Acting => "acting",
            RequestPhase::Finalizing => "finalizing",
            RequestPhase::Completed => "completed",
            RequestPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestPhase::Completed | RequestPhase::Failed)
    }

    /// Phases of the per-step loop.
    pub fn is_step_phase(&self) -> bool {
        matches!(
            self,
            RequestPhase::Retrieving
                | RequestPhase::Summarizing
                | RequestPhase::Deciding
                | RequestPhase::Acting
        )
    }

    /// Coarse status implied by this phase.
    pub fn status(&self) -> RequestStatus {
        match self {
            RequestPhase::Created => RequestStatus::Pending,
            RequestPhase::Completed => RequestStatus::Completed,
            RequestPhase::Failed => RequestStatus::Failed,
            _ => RequestStatus::Running,
        }
    }

    /// Whether `self → next` may be entered through `EnterPhase`, ignoring
    /// step indices.
    ///
    /// Step phases of different steps may interleave, so any step phase may
    /// follow any other here; the per-step order is checked by
    /// [`RequestPhase::next_in_step`].
    pub fn can_enter(&self, next: RequestPhase) -> bool {
        match (self, next) {
            (RequestPhase::Created, RequestPhase::Planning) => true,
            (RequestPhase::Planning, n) if n.is_step_phase() => true,
            (RequestPhase::Planning, RequestPhase::Finalizing) => true,
            (s, n) if s.is_step_phase() && (n.is_step_phase() || n == RequestPhase::Finalizing) => true,
            _ => false,
        }
    }
}

impl RequestPhase {
    /// The phase a step enters after `previous`, or `None` once the step
    /// has reached `acting`.
    pub fn next_in_step(previous: Option<RequestPhase>) -> Option<RequestPhase> {
        match previous {
            None => Some(RequestPhase::Retrieving),
            Some(RequestPhase::Retrieving) => Some(RequestPhase::Summarizing),
            Some(RequestPhase::Summarizing) => Some(RequestPhase::Deciding),
            Some(RequestPhase::Deciding) => Some(RequestPhase::Acting),
            Some(_) => None,
        }
    }
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RequestPhase {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestPhase::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| DomainError::invalid_value("request_phase", s))
    }
}

/// Aggregated result of a completed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RequestOutput {
    pub summary: String,
    /// Verified citations across all steps
    pub citations: Vec<Citation>,
    pub pending_action_ids: Vec<ActionId>,
    /// False when any step surfaced a degraded summary
    pub verified: bool,
    /// Citation tokens that could not be verified
    #[serde(default)]
    pub unverified_citations: Vec<String>,
    #[serde(default)]
    pub steps: Vec<StepResult>,
}

/// Why a request failed, and where.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFailure {
    pub reason: FailureReason,
    /// Stage that failed, if the failure happened inside the pipeline
    pub stage: Option<AgentType>,
    /// Task whose failure exhausted the retry budget
    pub task_id: Option<TaskId>,
    pub message: String,
}

impl RequestFailure {
    pub fn new(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            stage: None,
            task_id: None,
            message: message.into(),
        }
    }

    pub fn at_stage(mut self, stage: AgentType, task_id: Option<TaskId>) -> Self {
        self.stage = Some(stage);
        self.task_id = task_id;
        self
    }

    pub fn cancelled(by: impl fmt::Display) -> Self {
        Self::new(FailureReason::Cancelled, format!("cancelled by {}", by))
    }
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage {
            Some(stage) => write!(f, "{} at {}: {}", self.reason, stage, self.message),
            None => write!(f, "{}: {}", self.reason, self.message),
        }
    }
}

/// One user query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub user_id: String,
    pub query: String,
    pub status: RequestStatus,
    pub phase: RequestPhase,
    /// Index of the step being processed, when in a step phase
    pub current_step: Option<u32>,
    /// Last phase entered by each step
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub step_phases: BTreeMap<u32, RequestPhase>,
    pub output: Option<RequestOutput>,
    pub failure: Option<RequestFailure>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A state change on a [`Request`].
#[derive(Debug, Clone, PartialEq)]
pub enum RequestTransition {
    EnterPhase {
        phase: RequestPhase,
        step_index: Option<u32>,
    },
    Complete(RequestOutput),
    Fail(RequestFailure),
}

impl RequestTransition {
    pub fn enter(phase: RequestPhase) -> Self {
        RequestTransition::EnterPhase {
            phase,
            step_index: None,
        }
    }

    pub fn enter_step(phase: RequestPhase, step_index: u32) -> Self {
        RequestTransition::EnterPhase {
            phase,
            step_index: Some(step_index),
        }
    }

    pub fn event_type(&self) -> EventType {
        match self {
            RequestTransition::EnterPhase { .. } => EventType::RequestPhaseChanged,
            RequestTransition::Complete(_) => EventType::RequestCompleted,
            RequestTransition::Fail(_) => EventType::RequestFailed,
        }
    }
}

impl Request {
    pub fn new(user_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            id: RequestId::generate(),
            user_id: user_id.into(),
            query: query.into(),
            status: RequestStatus::Pending,
            phase: RequestPhase::Created,
            current_step: None,
            step_phases: BTreeMap::new(),
            output: None,
            failure: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    /// Apply a transition, returning the new state.
    ///
    /// Status only moves forward. Each step walks `retrieving → summarizing
    /// → deciding → acting` in order, and `finalizing` waits for every
    /// started step to reach `acting`. `Complete` is legal from `finalizing`
    /// only; `Fail` from any non-terminal phase.
    pub fn apply(
        &self,
        transition: &RequestTransition,
        now: DateTime<Utc>,
    ) -> Result<Request, DomainError> {
        if self.phase.is_terminal() {
            return Err(DomainError::AlreadyTerminal {
                entity: "request",
                status: self.phase.to_string(),
            });
        }

        let mut next = self.clone();
        match transition {
            RequestTransition::EnterPhase { phase, step_index } => {
                if !self.phase.can_enter(*phase) {
                    return Err(DomainError::invalid_transition("request", self.phase, phase));
                }
                if phase.is_step_phase() {
                    let index = step_index.ok_or_else(|| {
                        DomainError::invalid_value("step_index", "step phases need a step index")
                    })?;
                    let previous = self.step_phases.get(&index).copied();
                    if RequestPhase::next_in_step(previous) != Some(*phase) {
                        return Err(DomainError::invalid_transition(
                            "request step",
                            previous.map_or("planned", |p| p.as_str()),
                            phase,
                        ));
                    }
                    next.step_phases.insert(index, *phase);
                } else if *phase == RequestPhase::Finalizing
                    && let Some((index, unfinished)) = self
                        .step_phases
                        .iter()
                        .find(|(_, p)| **p != RequestPhase::Acting)
                {
                    return Err(DomainError::invalid_transition(
                        "request step",
                        format!("{} (step {})", unfinished, index),
                        phase,
                    ));
                }
                next.phase = *phase;
                next.current_step = if phase.is_step_phase() {
                    *step_index
                } else {
                    None
                };
            }
            RequestTransition::Complete(output) => {
                if self.phase != RequestPhase::Finalizing {
                    return Err(DomainError::invalid_transition(
                        "request",
                        self.phase,
                        RequestPhase::Completed,
                    ));
                }
                next.phase = RequestPhase::Completed;
                next.current_step = None;
                next.output = Some(output.clone());
                next.completed_at = Some(now);
            }
            RequestTransition::Fail(failure) => {
                next.phase = RequestPhase::Failed;
                next.failure = Some(failure.clone());
                next.completed_at = Some(now);
            }
        }
        next.status = next.phase.status();
        Ok(next)
    }
}
