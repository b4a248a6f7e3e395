//! Progress notification port
//!
//! Defines the interface for reporting progress while a request moves
//! through the pipeline.

use attest_domain::{AgentType, FailureReason, RequestId, RequestPhase};
use std::time::Duration;

/// Callback for progress updates during orchestration
///
/// Implementations live in the presentation layer and can display
/// progress in various ways (spinner, log lines, etc.)
pub trait PipelineProgress: Send + Sync {
    /// Called when the request enters a new phase
    fn on_phase(&self, _request_id: &RequestId, _phase: RequestPhase, _step: Option<u32>) {}

    /// Called when the planner has produced the plan
    fn on_plan(&self, _request_id: &RequestId, _steps: usize) {}

    /// Called before an agent is dispatched
    fn on_task_start(&self, _agent_type: AgentType, _attempt: u32) {}

    /// Called when an agent invocation ends
    fn on_task_complete(&self, _agent_type: AgentType, _success: bool) {}

    /// Called before a transient failure is retried
    fn on_retry(&self, _agent_type: AgentType, _reason: FailureReason, _delay: Duration) {}

    /// Called when a summary fails citation validation
    fn on_citation_mismatch(&self, _step: u32, _offending: &[String]) {}
}

/// No-op progress notifier for when progress reporting is not needed
pub struct NoProgress;

impl PipelineProgress for NoProgress {}
