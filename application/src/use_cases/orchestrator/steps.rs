//! Planning and per-step stages: retrieve, summarize (validated), decide,
//! and propose actions.

use super::RequestOrchestrator;
use super::types::{Halt, Verdict};
use crate::config::CitationPolicy;
use crate::ports::progress::PipelineProgress;
use attest_domain::citation::{resolve, validate};
use attest_domain::{
    Actor, AgentInput, AgentOutput, Citation, DecisionInput, FailureReason, PassageId,
    PendingAction, PlanStep, PlannerInput, Request, RequestPhase, RequestTransition,
    RetrieverInput, Step, StepResult, SummarizerInput, ValidationOutcome,
};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

impl RequestOrchestrator {
    pub(super) async fn enter(
        &self,
        request: &Request,
        transition: RequestTransition,
        progress: &dyn PipelineProgress,
    ) -> Result<(), Halt> {
        let updated = self
            .store
            .transition_request(&request.id, transition, Actor::System)
            .await?;
        progress.on_phase(&request.id, updated.phase, updated.current_step);
        Ok(())
    }

    /// Stop at a step boundary if the request was cancelled, here or by
    /// another process.
    pub(super) async fn ensure_live(
        &self,
        request: &Request,
        cancel: &CancellationToken,
    ) -> Result<(), Halt> {
        if cancel.is_cancelled() {
            return Err(Halt::cancelled());
        }
        match self.store.get_request(&request.id).await? {
            Some(current) if current.status.is_terminal() => Err(Halt::cancelled()),
            Some(_) => Ok(()),
            None => Err(Halt::internal(format!("request {} vanished", request.id))),
        }
    }

    pub(super) async fn plan(
        &self,
        request: &Request,
        cancel: &CancellationToken,
        progress: &dyn PipelineProgress,
    ) -> Result<Vec<PlanStep>, Halt> {
        let input = AgentInput::Planner(PlannerInput {
            query: request.query.clone(),
            user_id: request.user_id.clone(),
            correction: None,
        });
        let planned = self
            .invoke(request, None, input, cancel, progress, |output| match output {
                AgentOutput::Planner(plan) if plan.steps.is_empty() => {
                    Verdict::reject(FailureReason::InvalidOutput, "planner returned no steps")
                }
                AgentOutput::Planner(plan)
                    if plan.steps.iter().any(|s| s.retrieval_query.trim().is_empty()) =>
                {
                    Verdict::reject(
                        FailureReason::InvalidOutput,
                        "planner returned a step without a retrieval query",
                    )
                }
                _ => Verdict::Accept,
            })
            .await?;

        match planned.output {
            AgentOutput::Planner(plan) => {
                info!(
                    request_id = %request.id,
                    task_id = %planned.task_id,
                    steps = plan.steps.len(),
                    "Plan accepted"
                );
                Ok(plan.steps)
            }
            other => Err(Halt::internal(format!(
                "planner produced {} output",
                other.agent_type()
            ))),
        }
    }

    pub(super) async fn run_step(
        &self,
        request: &Request,
        step: &Step,
        prior_summaries: &[String],
        cancel: &CancellationToken,
        progress: &dyn PipelineProgress,
    ) -> Result<StepResult, Halt> {
        let index = step.index;

        // ==================== Retrieve ====================
        self.enter(
            request,
            RequestTransition::enter_step(RequestPhase::Retrieving, index),
            progress,
        )
        .await?;
        let retrieved = self
            .invoke(
                request,
                Some(index),
                AgentInput::Retriever(RetrieverInput {
                    query: step.plan.retrieval_query.clone(),
                    user_id: request.user_id.clone(),
                    top_n: self.config.top_n,
                }),
                cancel,
                progress,
                |_| Verdict::Accept,
            )
            .await?;
        let ranked = match retrieved.output {
            AgentOutput::Retriever(r) => r.passages,
            other => {
                return Err(Halt::internal(format!(
                    "retriever produced {} output",
                    other.agent_type()
                )));
            }
        };

        let ids: Vec<PassageId> = ranked
            .iter()
            .take(self.config.top_n)
            .map(|r| r.passage_id.clone())
            .collect();
        let scores: HashMap<PassageId, f64> = ranked
            .iter()
            .map(|r| (r.passage_id.clone(), r.score))
            .collect();
        // The exact set handed to the summarizer is the validator's allowed set
        let allowed = self.store.get_passages(&ids).await?;
        if allowed.len() < ids.len() {
            warn!(
                request_id = %request.id,
                step = index,
                returned = ids.len(),
                known = allowed.len(),
                "Retriever returned passages unknown to the store"
            );
        }

        // ==================== Summarize ====================
        self.enter(
            request,
            RequestTransition::enter_step(RequestPhase::Summarizing, index),
            progress,
        )
        .await?;
        let summarizer_input = AgentInput::Summarizer(SummarizerInput {
            query: request.query.clone(),
            goal: step.plan.goal.clone(),
            passages: allowed.clone(),
            prior_summaries: if step.plan.independent {
                Vec::new()
            } else {
                prior_summaries.to_vec()
            },
            correction: None,
        });
        let summarized = self
            .invoke(
                request,
                Some(index),
                summarizer_input,
                cancel,
                progress,
                |output| match output {
                    AgentOutput::Summarizer(s) => {
                        match validate(&s.summary_text, &s.citations, &allowed) {
                            ValidationOutcome::Valid => Verdict::Accept,
                            ValidationOutcome::Invalid(offending) => {
                                progress.on_citation_mismatch(index, &offending);
                                Verdict::reject(
                                    FailureReason::CitationMismatch,
                                    format!("unverifiable citations: {}", offending.join(", ")),
                                )
                            }
                        }
                    }
                    _ => Verdict::Accept,
                },
            )
            .await;

        let (summary, tokens, verified, unverified_tokens) = match summarized {
            Ok(invoked) => match invoked.output {
                AgentOutput::Summarizer(s) => (s.summary_text, s.citations, true, Vec::new()),
                other => {
                    return Err(Halt::internal(format!(
                        "summarizer produced {} output",
                        other.agent_type()
                    )));
                }
            },
            Err(halt)
                if halt.failure.reason == FailureReason::CitationMismatch
                    && self.config.citation_policy == CitationPolicy::Degrade =>
            {
                match halt.last_output {
                    Some(AgentOutput::Summarizer(s)) => {
                        let offending = validate(&s.summary_text, &s.citations, &allowed)
                            .offending()
                            .to_vec();
                        warn!(
                            request_id = %request.id,
                            step = index,
                            offending = ?offending,
                            "Surfacing summary flagged as unverified"
                        );
                        (s.summary_text, s.citations, false, offending)
                    }
                    _ => {
                        return Err(Halt {
                            failure: halt.failure,
                            last_output: None,
                        });
                    }
                }
            }
            Err(halt) => return Err(halt),
        };

        let citations: Vec<Citation> = resolve(&summary, &tokens, &allowed)
            .into_iter()
            .map(|(_, passage)| {
                Citation::from_passage(passage, scores.get(&passage.id).copied().unwrap_or(0.0))
            })
            .collect();

        // ==================== Decide ====================
        self.enter(
            request,
            RequestTransition::enter_step(RequestPhase::Deciding, index),
            progress,
        )
        .await?;
        let decided = self
            .invoke(
                request,
                Some(index),
                AgentInput::Decision(DecisionInput {
                    query: request.query.clone(),
                    goal: step.plan.goal.clone(),
                    summary: summary.clone(),
                    correction: None,
                }),
                cancel,
                progress,
                |output| match output {
                    AgentOutput::Decision(d)
                        if d.actions.iter().any(|a| {
                            a.action_type.trim().is_empty() || a.target_service.trim().is_empty()
                        }) =>
                    {
                        Verdict::reject(
                            FailureReason::InvalidOutput,
                            "proposed action without action_type or target_service",
                        )
                    }
                    _ => Verdict::Accept,
                },
            )
            .await?;
        let proposals = match decided.output {
            AgentOutput::Decision(d) => d.actions,
            other => {
                return Err(Halt::internal(format!(
                    "decision produced {} output",
                    other.agent_type()
                )));
            }
        };

        // ==================== Act ====================
        // Proposed actions are only persisted as pending; nothing executes
        // before the approval gate resolves them.
        self.enter(
            request,
            RequestTransition::enter_step(RequestPhase::Acting, index),
            progress,
        )
        .await?;
        let actions: Vec<PendingAction> = proposals
            .into_iter()
            .map(|proposed| PendingAction::propose(request.id.clone(), proposed))
            .collect();
        if !actions.is_empty() {
            self.store
                .insert_actions(&actions, Actor::agent(decided_actor()))
                .await?;
            info!(
                request_id = %request.id,
                step = index,
                count = actions.len(),
                "Actions proposed, awaiting approval"
            );
        }

        Ok(StepResult {
            index,
            goal: step.plan.goal.clone(),
            summary,
            citations,
            verified,
            unverified_tokens,
            action_ids: actions.into_iter().map(|a| a.id).collect(),
        })
    }
}

fn decided_actor() -> &'static str {
    attest_domain::AgentType::Decision.as_str()
}
