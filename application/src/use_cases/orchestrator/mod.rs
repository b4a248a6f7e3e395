//! Request orchestrator
//!
//! Drives one query through the pipeline as an explicit state machine:
//!
//! | Phase       | Agent      | Per step |
//! |-------------|------------|----------|
//! | planning    | planner    | no       |
//! | retrieving  | retriever  | yes      |
//! | summarizing | summarizer | yes      |
//! | deciding    | decision   | yes      |
//! | acting      | (none)     | yes      |
//! | finalizing  | (none)     | no       |
//!
//! Every phase change and every task is persisted through the
//! [`PersistentStore`], which records the matching audit event in the same
//! transaction. Proposed actions are stored as pending and never executed
//! here; execution belongs to the [`ApprovalGate`](crate::ApprovalGate).

mod handles;
mod invoke;
mod steps;
mod types;

pub use handles::{HandleGuard, RequestHandles};
pub use types::{OrchestratorError, QueryResponse, RecoveryReport, SubmitQueryInput};

use crate::config::OrchestratorConfig;
use crate::fabric::TaskFabric;
use crate::ports::progress::{NoProgress, PipelineProgress};
use crate::ports::store::{ActionQuery, PersistentStore, StoreError};
use attest_domain::{
    ActionStatus, ActionTransition, Actor, AgentType, Citation, FailureReason, PassageId,
    PendingAction, Request, RequestFailure, RequestId, RequestOutput, RequestPhase,
    RequestTransition, Step, StepResult, TaskTransition,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use types::Halt;

/// Use case for submitting and managing requests
pub struct RequestOrchestrator {
    store: Arc<dyn PersistentStore>,
    fabric: Arc<TaskFabric>,
    config: OrchestratorConfig,
    handles: RequestHandles,
}

impl RequestOrchestrator {
    pub fn new(
        store: Arc<dyn PersistentStore>,
        fabric: Arc<TaskFabric>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            fabric,
            config,
            handles: RequestHandles::new(),
        }
    }

    /// Share a handle registry with other orchestrators of this process.
    pub fn with_handles(mut self, handles: RequestHandles) -> Self {
        self.handles = handles;
        self
    }

    pub fn handles(&self) -> &RequestHandles {
        &self.handles
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run a query to completion.
    pub async fn submit(&self, input: SubmitQueryInput) -> Result<QueryResponse, OrchestratorError> {
        self.submit_with_progress(input, &NoProgress).await
    }

    /// Run a query to completion, reporting progress.
    pub async fn submit_with_progress(
        &self,
        input: SubmitQueryInput,
        progress: &dyn PipelineProgress,
    ) -> Result<QueryResponse, OrchestratorError> {
        let query = input.query.trim();
        if query.is_empty() {
            return Err(OrchestratorError::EmptyQuery);
        }

        let request = Request::new(input.user_id.clone(), query);
        self.store
            .insert_request(&request, Actor::user(input.user_id.clone()))
            .await?;
        info!(
            request_id = %request.id,
            user_id = %request.user_id,
            "Request created"
        );

        let guard = self.handles.register(&request.id);
        let outcome = self.drive(&request, guard.token(), progress).await;

        match outcome {
            Ok(results) => match self.finalize(&request, results, progress).await {
                Ok(response) => Ok(response),
                Err(halt) => Err(self.fail(&request.id, halt.failure).await),
            },
            Err(halt) => Err(self.fail(&request.id, halt.failure).await),
        }
    }

    async fn drive(
        &self,
        request: &Request,
        cancel: &CancellationToken,
        progress: &dyn PipelineProgress,
    ) -> Result<Vec<StepResult>, Halt> {
        self.enter(request, RequestTransition::enter(RequestPhase::Planning), progress)
            .await?;
        let plan = self.plan(request, cancel, progress).await?;
        let steps = Step::from_plan(plan);
        progress.on_plan(&request.id, steps.len());

        let batches = if self.config.parallel_independent_steps {
            Step::batches(&steps)
        } else {
            steps.iter().map(|s| vec![s.clone()]).collect()
        };

        let mut results: Vec<StepResult> = Vec::with_capacity(steps.len());
        for batch in batches {
            self.ensure_live(request, cancel).await?;
            let prior: Vec<String> = results.iter().map(|r| r.summary.clone()).collect();

            if batch.len() == 1 {
                let result = self
                    .run_step(request, &batch[0], &prior, cancel, progress)
                    .await?;
                results.push(result);
            } else {
                let runs = batch
                    .iter()
                    .map(|step| self.run_step(request, step, &prior, cancel, progress));
                for result in futures::future::join_all(runs).await {
                    results.push(result?);
                }
            }
        }

        results.sort_by_key(|r| r.index);
        Ok(results)
    }

    async fn finalize(
        &self,
        request: &Request,
        results: Vec<StepResult>,
        progress: &dyn PipelineProgress,
    ) -> Result<QueryResponse, Halt> {
        self.enter(request, RequestTransition::enter(RequestPhase::Finalizing), progress)
            .await?;

        let open: Vec<_> = self
            .store
            .list_tasks(&request.id)
            .await?
            .into_iter()
            .filter(|t| !t.status.is_terminal())
            .map(|t| t.id)
            .collect();
        if !open.is_empty() {
            return Err(Halt::internal(format!(
                "{} task(s) still open at finalization",
                open.len()
            )));
        }

        let output = aggregate(results);
        let completed = self
            .store
            .transition_request(&request.id, RequestTransition::Complete(output), Actor::System)
            .await?;
        progress.on_phase(&completed.id, completed.phase, None);
        info!(
            request_id = %completed.id,
            verified = completed.output.as_ref().is_some_and(|o| o.verified),
            "Request completed"
        );
        Ok(QueryResponse::from_request(completed))
    }

    /// Record the failure. If the request was already terminated elsewhere
    /// (a cancel, possibly from another process), report that record's
    /// failure instead.
    async fn fail(&self, request_id: &RequestId, failure: RequestFailure) -> OrchestratorError {
        let result = self
            .store
            .transition_request(
                request_id,
                RequestTransition::Fail(failure.clone()),
                Actor::System,
            )
            .await;

        let failure = match result {
            Ok(_) => {
                warn!(request_id = %request_id, failure = %failure, "Request failed");
                failure
            }
            Err(e) if e.is_already_terminal() => match self.store.get_request(request_id).await {
                Ok(Some(record)) => record.failure.unwrap_or(failure),
                Ok(None) => failure,
                Err(e) => return OrchestratorError::Store(e),
            },
            Err(e) => return OrchestratorError::Store(e),
        };

        OrchestratorError::RequestFailed {
            request_id: request_id.clone(),
            failure,
        }
    }

    /// Cancel a request on behalf of its owner.
    ///
    /// The failure is recorded durably first, so a request driven by another
    /// process stops at its next transition. A request live in this process
    /// also has its token fired.
    pub async fn cancel(
        &self,
        request_id: &RequestId,
        user_id: &str,
    ) -> Result<Request, OrchestratorError> {
        let request = self
            .store
            .get_request(request_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(request_id.clone()))?;
        if !request.is_owned_by(user_id) {
            return Err(OrchestratorError::Unauthorized {
                request_id: request_id.clone(),
                user_id: user_id.to_string(),
            });
        }
        if request.status.is_terminal() {
            return Err(OrchestratorError::AlreadyTerminal {
                request_id: request_id.clone(),
                status: request.status,
            });
        }

        let actor = Actor::user(user_id);
        let cancelled = match self
            .store
            .transition_request(
                request_id,
                RequestTransition::Fail(RequestFailure::cancelled(&actor)),
                actor,
            )
            .await
        {
            Ok(record) => record,
            Err(e) if e.is_already_terminal() => {
                let status = self
                    .store
                    .get_request(request_id)
                    .await?
                    .map(|r| r.status)
                    .unwrap_or(request.status);
                return Err(OrchestratorError::AlreadyTerminal {
                    request_id: request_id.clone(),
                    status,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let live = self.handles.cancel(request_id);
        info!(request_id = %request_id, user_id, live, "Request cancelled");
        Ok(cancelled)
    }

    /// Fail requests and approved actions left in flight by a previous
    /// process.
    ///
    /// Requests live in this process are left alone. Open tasks of orphaned
    /// requests are failed first, then the request itself. An approved
    /// action whose outcome was never recorded becomes `execution_failed`;
    /// it is not executed again. Run before any approval is resolved in
    /// this process.
    pub async fn recover_orphans(&self) -> Result<RecoveryReport, OrchestratorError> {
        let mut report = RecoveryReport::default();

        for request in self.store.list_active_requests().await? {
            if self.handles.is_live(&request.id) {
                continue;
            }

            report.tasks += self.fail_open_tasks(&request.id, None).await?;

            let failure = RequestFailure::new(
                FailureReason::Orphaned,
                format!("request abandoned in phase {}", request.phase),
            );
            match self
                .store
                .transition_request(&request.id, RequestTransition::Fail(failure), Actor::System)
                .await
            {
                Ok(_) => {
                    warn!(request_id = %request.id, phase = %request.phase, "Orphaned request failed");
                    report.requests.push(request.id);
                }
                Err(e) if e.is_already_terminal() => {}
                Err(e) => return Err(e.into()),
            }
        }

        let approved = self
            .store
            .list_actions(&ActionQuery::with_status(ActionStatus::Approved))
            .await?;
        for action in approved {
            report.tasks += self
                .fail_open_tasks(&action.request_id, Some(AgentType::Action))
                .await?;
            if self.fail_orphaned_action(&action).await? {
                report.actions.push(action.id);
            }
        }

        Ok(report)
    }

    /// Fail the non-terminal tasks of a request, optionally only those of
    /// one stage. Returns how many were failed.
    async fn fail_open_tasks(
        &self,
        request_id: &RequestId,
        agent_type: Option<AgentType>,
    ) -> Result<usize, OrchestratorError> {
        let mut failed = 0;
        for task in self.store.list_tasks(request_id).await? {
            if task.status.is_terminal() || agent_type.is_some_and(|t| t != task.agent_type) {
                continue;
            }
            match self
                .store
                .transition_task(
                    &task.id,
                    TaskTransition::Fail {
                        reason: FailureReason::Orphaned,
                        error: "process exited while the task was open".to_string(),
                        output: None,
                    },
                    Actor::System,
                )
                .await
            {
                Ok(_) => failed += 1,
                Err(e) if e.is_already_terminal() => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(failed)
    }

    async fn fail_orphaned_action(&self, action: &PendingAction) -> Result<bool, OrchestratorError> {
        let transition = ActionTransition::MarkExecutionFailed {
            error: format!(
                "{}: process exited before the {} outcome was recorded",
                FailureReason::Orphaned,
                action.target_service
            ),
        };
        match self
            .store
            .transition_action(
                &action.id,
                ActionStatus::Approved,
                transition,
                Actor::System,
                None,
            )
            .await
        {
            Ok(_) => {
                warn!(
                    action_id = %action.id,
                    request_id = %action.request_id,
                    "Orphaned approved action marked execution_failed"
                );
                Ok(true)
            }
            Err(StoreError::Conflict { .. }) => Ok(false),
            Err(e) if e.is_already_terminal() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Combine step results into the request output.
fn aggregate(results: Vec<StepResult>) -> RequestOutput {
    let summary = results
        .iter()
        .map(|r| r.summary.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut seen: HashSet<PassageId> = HashSet::new();
    let citations: Vec<Citation> = results
        .iter()
        .flat_map(|r| r.citations.iter())
        .filter(|c| seen.insert(c.passage_id.clone()))
        .cloned()
        .collect();

    RequestOutput {
        summary,
        citations,
        pending_action_ids: results.iter().flat_map(|r| r.action_ids.clone()).collect(),
        verified: results.iter().all(|r| r.verified),
        unverified_citations: results
            .iter()
            .flat_map(|r| r.unverified_tokens.clone())
            .collect(),
        steps: results,
    }
}

#[cfg(test)]
mod tests;
