//! One logical agent invocation with its retry and correction policy.
//!
//! Every attempt is a fresh task. Transient failures (timeout, upstream
//! unavailable) are retried with backoff up to the policy's attempt budget.
//! Invalid output and citation mismatches get exactly one corrective
//! re-invocation carrying a tightened instruction.

use super::RequestOrchestrator;
use super::types::{Halt, Invoked, Verdict};
use crate::ports::progress::PipelineProgress;
use attest_domain::{
    Actor, AgentInput, AgentOutput, FailureReason, Request, RequestFailure, Task, TaskTransition,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

impl RequestOrchestrator {
    pub(super) async fn invoke<F>(
        &self,
        request: &Request,
        step_index: Option<u32>,
        input: AgentInput,
        cancel: &CancellationToken,
        progress: &dyn PipelineProgress,
        check: F,
    ) -> Result<Invoked, Halt>
    where
        F: Fn(&AgentOutput) -> Verdict,
    {
        let agent_type = input.agent_type();
        let mut input = input;
        let mut attempt = 0u32;
        let mut transient_failures = 0u32;
        let mut corrected = false;

        loop {
            if cancel.is_cancelled() {
                return Err(Halt::cancelled());
            }
            attempt += 1;

            let task = Task::new(
                request.id.clone(),
                agent_type,
                step_index,
                attempt,
                input.to_value(),
            );
            self.store.insert_task(&task, Actor::System).await?;
            self.store
                .transition_task(&task.id, TaskTransition::Start, Actor::System)
                .await?;
            progress.on_task_start(agent_type, attempt);
            debug!(
                request_id = %request.id,
                task_id = %task.id,
                agent_type = %agent_type,
                attempt,
                "Dispatching task"
            );

            let dispatched = self
                .fabric
                .dispatch(&task.id, input.clone(), self.config.agent_timeout, cancel)
                .await;

            let (reason, message, kept) = match dispatched {
                Ok(output) if output.agent_type() != agent_type => (
                    FailureReason::InvalidOutput,
                    format!(
                        "expected {} output, got {}",
                        agent_type,
                        output.agent_type()
                    ),
                    None,
                ),
                Ok(output) => match check(&output) {
                    Verdict::Accept => {
                        self.store
                            .transition_task(
                                &task.id,
                                TaskTransition::Succeed {
                                    output: output.to_value(),
                                },
                                Actor::agent(agent_type.as_str()),
                            )
                            .await?;
                        progress.on_task_complete(agent_type, true);
                        return Ok(Invoked {
                            task_id: task.id,
                            output,
                        });
                    }
                    Verdict::Reject { reason, message } => (reason, message, Some(output)),
                },
                Err(e) => (e.reason(), e.to_string(), None),
            };

            self.store
                .transition_task(
                    &task.id,
                    TaskTransition::Fail {
                        reason,
                        error: message.clone(),
                        output: kept.as_ref().map(AgentOutput::to_value),
                    },
                    Actor::System,
                )
                .await?;
            progress.on_task_complete(agent_type, false);
            warn!(
                request_id = %request.id,
                task_id = %task.id,
                agent_type = %agent_type,
                attempt,
                reason = %reason,
                error = %message,
                "Agent invocation failed"
            );

            if reason == FailureReason::Cancelled {
                return Err(Halt::new(
                    RequestFailure::new(reason, "request cancelled")
                        .at_stage(agent_type, Some(task.id)),
                ));
            }

            if reason.is_transient() {
                transient_failures += 1;
                if self.config.retry.allows_retry(transient_failures) {
                    let delay = self.config.retry.backoff(transient_failures);
                    progress.on_retry(agent_type, reason, delay);
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(Halt::cancelled()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    continue;
                }
            } else if reason.is_correctable() && !corrected {
                corrected = true;
                let instruction = corrective_instruction(&input, reason, &message);
                input = input.with_correction(instruction);
                continue;
            }

            return Err(Halt {
                failure: RequestFailure::new(reason, message).at_stage(agent_type, Some(task.id)),
                last_output: kept,
            });
        }
    }
}

/// Tightened instruction for the corrective attempt.
pub(super) fn corrective_instruction(
    input: &AgentInput,
    reason: FailureReason,
    message: &str,
) -> String {
    match (input, reason) {
        (AgentInput::Summarizer(summarizer), FailureReason::CitationMismatch) => {
            let ids: Vec<&str> = summarizer.passages.iter().map(|p| p.id.as_str()).collect();
            format!(
                "Your previous answer was rejected: {}. Citations must reference only the \
                 following passage ids: {}. Write every citation as \
                 [cite:<doc_id>|<page or ->|<passage_id>] using the doc_id and page shown \
                 for that passage.",
                message,
                ids.join(", ")
            )
        }
        _ => format!(
            "Your previous answer was rejected: {}. Respond with a single JSON object \
             matching the required schema and nothing else.",
            message
        ),
    }
}
