//! Type definitions for the request orchestrator.

use crate::ports::store::StoreError;
use attest_domain::{
    ActionId, AgentOutput, Citation, FailureReason, Request, RequestFailure, RequestId,
    RequestStatus, StepResult, TaskId,
};
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur while driving or managing a request
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Query must not be empty")]
    EmptyQuery,

    #[error("Request {request_id} failed: {failure}")]
    RequestFailed {
        request_id: RequestId,
        failure: RequestFailure,
    },

    #[error("Request {0} not found")]
    NotFound(RequestId),

    #[error("User {user_id} is not allowed to act on request {request_id}")]
    Unauthorized {
        request_id: RequestId,
        user_id: String,
    },

    #[error("Request {request_id} is already {status}")]
    AlreadyTerminal {
        request_id: RequestId,
        status: RequestStatus,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl OrchestratorError {
    /// The failure record, when the request itself failed
    pub fn failure(&self) -> Option<&RequestFailure> {
        match self {
            OrchestratorError::RequestFailed { failure, .. } => Some(failure),
            _ => None,
        }
    }
}

/// Input for a query submission
#[derive(Debug, Clone)]
pub struct SubmitQueryInput {
    pub user_id: String,
    pub query: String,
}

impl SubmitQueryInput {
    pub fn new(user_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            query: query.into(),
        }
    }
}

/// Caller-facing result of a completed request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub request_id: RequestId,
    pub summary: String,
    pub citations: Vec<Citation>,
    pub pending_action_ids: Vec<ActionId>,
    /// False when some summary is surfaced with unverifiable citations
    pub verified: bool,
    pub unverified_citations: Vec<String>,
    pub steps: Vec<StepResult>,
}

impl QueryResponse {
    pub fn from_request(request: Request) -> Self {
        let output = request.output.unwrap_or_default();
        Self {
            request_id: request.id,
            summary: output.summary,
            citations: output.citations,
            pending_action_ids: output.pending_action_ids,
            verified: output.verified,
            unverified_citations: output.unverified_citations,
            steps: output.steps,
        }
    }
}

/// Records failed by orphan recovery
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecoveryReport {
    pub requests: Vec<RequestId>,
    pub tasks: usize,
    /// Approved actions whose outcome was never recorded
    pub actions: Vec<ActionId>,
}

impl RecoveryReport {
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.tasks == 0 && self.actions.is_empty()
    }
}

/// A stage output that passed validation.
pub(super) struct Invoked {
    pub task_id: TaskId,
    pub output: AgentOutput,
}

/// Semantic check of a stage output.
pub(super) enum Verdict {
    Accept,
    Reject {
        reason: FailureReason,
        message: String,
    },
}

impl Verdict {
    pub fn reject(reason: FailureReason, message: impl Into<String>) -> Self {
        Verdict::Reject {
            reason,
            message: message.into(),
        }
    }
}

/// Why the pipeline stopped before finalizing.
#[derive(Debug)]
pub(super) struct Halt {
    pub failure: RequestFailure,
    /// Output of the last failed attempt, kept for degraded summaries
    pub last_output: Option<AgentOutput>,
}

impl Halt {
    pub fn new(failure: RequestFailure) -> Self {
        Self {
            failure,
            last_output: None,
        }
    }

    pub fn cancelled() -> Self {
        Self::new(RequestFailure::new(
            FailureReason::Cancelled,
            "request cancelled",
        ))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(RequestFailure::new(FailureReason::Internal, message))
    }
}

impl From<StoreError> for Halt {
    fn from(err: StoreError) -> Self {
        if err.is_already_terminal() {
            Halt::new(RequestFailure::new(
                FailureReason::Cancelled,
                "request was terminated elsewhere",
            ))
        } else {
            Halt::internal(err.to_string())
        }
    }
}
