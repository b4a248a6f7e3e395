//! Approval gate
//!
//! Side-effecting actions proposed by the decision stage wait in `pending`
//! until an approver resolves them. Resolution is a compare-and-swap on the
//! `pending` status, so of two concurrent resolutions exactly one wins. An
//! approved action is dispatched once to the action agent; its outcome is
//! recorded as `executed` or `execution_failed` and never retried.

use crate::fabric::TaskFabric;
use crate::ports::approvers::ApproverDirectory;
use crate::ports::store::{ActionQuery, PersistentStore, StoreError};
use attest_domain::{
    ActionId, ActionInput, ActionStatus, ActionTransition, Actor, AgentInput, AgentOutput,
    AgentType, DomainError, PendingAction, Task, TaskTransition,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Errors that can occur when listing or resolving actions
#[derive(Error, Debug)]
pub enum ApprovalError {
    #[error("User {user_id} is not an approver")]
    Unauthorized { user_id: String },

    #[error("Action {0} not found")]
    NotFound(ActionId),

    #[error("Action {action_id} is {status}, not pending")]
    ActionStateConflict { action_id: ActionId, status: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Who resolved an action, and their optional signature.
#[derive(Debug, Clone, PartialEq)]
pub struct ActorSignature {
    pub user_id: String,
    pub signature: Option<String>,
}

impl ActorSignature {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            signature: None,
        }
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }
}

/// Use case for listing and resolving pending actions
pub struct ApprovalGate {
    store: Arc<dyn PersistentStore>,
    fabric: Arc<TaskFabric>,
    approvers: Arc<dyn ApproverDirectory>,
    action_timeout: Duration,
}

impl ApprovalGate {
    pub fn new(
        store: Arc<dyn PersistentStore>,
        fabric: Arc<TaskFabric>,
        approvers: Arc<dyn ApproverDirectory>,
    ) -> Self {
        Self {
            store,
            fabric,
            approvers,
            action_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }

    /// Pending actions visible to the user.
    ///
    /// Approvers see every pending action; anyone else sees the pending
    /// actions of their own requests. Has no side effects.
    pub async fn list_pending(&self, user_id: &str) -> Result<Vec<PendingAction>, ApprovalError> {
        let query = if self.approvers.is_approver(user_id) {
            ActionQuery::pending()
        } else {
            ActionQuery::pending().owned_by(user_id)
        };
        Ok(self.store.list_actions(&query).await?)
    }

    /// Approve or reject a pending action.
    ///
    /// Returns the action in its final state: `rejected`, `executed` or
    /// `execution_failed`.
    pub async fn resolve(
        &self,
        action_id: &ActionId,
        approved: bool,
        actor: &ActorSignature,
    ) -> Result<PendingAction, ApprovalError> {
        if !self.approvers.is_approver(&actor.user_id) {
            return Err(ApprovalError::Unauthorized {
                user_id: actor.user_id.clone(),
            });
        }

        let transition = if approved {
            ActionTransition::Approve {
                by: actor.user_id.clone(),
            }
        } else {
            ActionTransition::Reject {
                by: actor.user_id.clone(),
            }
        };
        let extra = actor
            .signature
            .as_ref()
            .map(|signature| json!({ "signature": signature }));

        let resolved = self
            .store
            .transition_action(
                action_id,
                ActionStatus::Pending,
                transition,
                Actor::user(actor.user_id.clone()),
                extra,
            )
            .await
            .map_err(|e| state_error(action_id, e))?;
        info!(
            action_id = %action_id,
            request_id = %resolved.request_id,
            status = %resolved.status,
            by = %actor.user_id,
            "Action resolved"
        );

        if !approved {
            return Ok(resolved);
        }
        self.execute(resolved).await
    }

    async fn execute(&self, action: PendingAction) -> Result<PendingAction, ApprovalError> {
        let input = AgentInput::Action(ActionInput {
            action_id: action.id.clone(),
            action_type: action.action_type.clone(),
            target_service: action.target_service.clone(),
            payload: action.payload.clone(),
        });
        let task = Task::new(
            action.request_id.clone(),
            AgentType::Action,
            None,
            1,
            input.to_value(),
        );
        self.store.insert_task(&task, Actor::System).await?;
        self.store
            .transition_task(&task.id, TaskTransition::Start, Actor::System)
            .await?;

        let agent = Actor::agent(AgentType::Action.as_str());
        let dispatched = self
            .fabric
            .dispatch(&task.id, input, self.action_timeout, &CancellationToken::new())
            .await;

        let (task_transition, action_transition) = match dispatched {
            Ok(AgentOutput::Action(output)) if output.is_failure() => {
                let error = output.failure_message();
                (
                    TaskTransition::Fail {
                        reason: attest_domain::FailureReason::UpstreamUnavailable,
                        error: error.clone(),
                        output: Some(output.into_record()),
                    },
                    ActionTransition::MarkExecutionFailed { error },
                )
            }
            Ok(AgentOutput::Action(output)) => {
                let result = output.into_record();
                (
                    TaskTransition::Succeed {
                        output: result.clone(),
                    },
                    ActionTransition::MarkExecuted { result },
                )
            }
            Ok(other) => {
                let error = format!("action agent produced {} output", other.agent_type());
                (
                    TaskTransition::Fail {
                        reason: attest_domain::FailureReason::InvalidOutput,
                        error: error.clone(),
                        output: Some(other.to_value()),
                    },
                    ActionTransition::MarkExecutionFailed { error },
                )
            }
            Err(e) => (
                TaskTransition::Fail {
                    reason: e.reason(),
                    error: e.to_string(),
                    output: None,
                },
                ActionTransition::MarkExecutionFailed {
                    error: e.to_string(),
                },
            ),
        };

        let task_actor = match &task_transition {
            TaskTransition::Succeed { .. } => agent.clone(),
            _ => Actor::System,
        };
        self.store
            .transition_task(&task.id, task_transition, task_actor)
            .await?;

        let finished = self
            .store
            .transition_action(
                &action.id,
                ActionStatus::Approved,
                action_transition,
                agent,
                Some(json!({ "task_id": task.id })),
            )
            .await
            .map_err(|e| state_error(&action.id, e))?;

        if finished.status == ActionStatus::ExecutionFailed {
            warn!(
                action_id = %finished.id,
                target_service = %finished.target_service,
                "Action execution failed"
            );
        } else {
            info!(
                action_id = %finished.id,
                target_service = %finished.target_service,
                "Action executed"
            );
        }
        Ok(finished)
    }
}

fn state_error(action_id: &ActionId, err: StoreError) -> ApprovalError {
    match err {
        StoreError::NotFound { .. } => ApprovalError::NotFound(action_id.clone()),
        StoreError::Conflict { actual, .. } => ApprovalError::ActionStateConflict {
            action_id: action_id.clone(),
            status: actual,
        },
        StoreError::Transition(DomainError::InvalidTransition { from, .. }) => {
            ApprovalError::ActionStateConflict {
                action_id: action_id.clone(),
                status: from,
            }
        }
        other => ApprovalError::Store(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FabricConfig;
    use crate::ports::agent::{AgentError, AgentRegistry};
    use crate::ports::approvers::StaticApprovers;
    use crate::testing::{MemoryStore, ScriptedAgent};
    use attest_domain::audit::{action_status_history, is_legal_action_history};
    use attest_domain::{ActionOutput, ProposedAction, Request, RequestId};

    async fn setup(
        action_agent: ScriptedAgent,
    ) -> (Arc<MemoryStore>, Arc<ApprovalGate>, Vec<ActionId>, Arc<ScriptedAgent>) {
        let store = Arc::new(MemoryStore::new());
        let alice = Request::new("alice", "Summarize login incidents");
        let bob = Request::new("bob", "Summarize billing incidents");
        for request in [&alice, &bob] {
            store
                .insert_request(request, Actor::user(request.user_id.clone()))
                .await
                .unwrap();
        }

        let actions: Vec<PendingAction> = [&alice.id, &bob.id]
            .into_iter()
            .map(|request_id: &RequestId| {
                PendingAction::propose(
                    request_id.clone(),
                    ProposedAction::new("create_ticket", "jira", json!({"summary": "x"})),
                )
            })
            .collect();
        store
            .insert_actions(&actions, Actor::agent("decision"))
            .await
            .unwrap();

        let action_agent = Arc::new(action_agent);
        let registry = AgentRegistry::new().register(action_agent.clone());
        let fabric = Arc::new(TaskFabric::start(&registry, &FabricConfig::default()));
        let gate = ApprovalGate::new(
            store.clone(),
            fabric,
            Arc::new(StaticApprovers::new(["carol"])),
        )
        .with_action_timeout(Duration::from_secs(5));
        (
            store,
            Arc::new(gate),
            actions.into_iter().map(|a| a.id).collect(),
            action_agent,
        )
    }

    fn created() -> ScriptedAgent {
        ScriptedAgent::always(
            AgentType::Action,
            AgentOutput::Action(ActionOutput {
                status: "created".to_string(),
                result: json!({"key": "OPS-1"}),
            }),
        )
    }

    #[tokio::test]
    async fn test_unauthorized_is_rejected_before_any_read() {
        let (_, gate, _, _) = setup(created()).await;
        let err = gate
            .resolve(&ActionId::new("missing"), true, &ActorSignature::new("mallory"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApprovalError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_unknown_action_is_not_found() {
        let (_, gate, _, _) = setup(created()).await;
        let err = gate
            .resolve(&ActionId::new("missing"), true, &ActorSignature::new("carol"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApprovalError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_approve_executes_once() {
        let (store, gate, ids, agent) = setup(created()).await;
        let signer = ActorSignature::new("carol").with_signature("sig-123");

        let action = gate.resolve(&ids[0], true, &signer).await.unwrap();
        assert_eq!(action.status, ActionStatus::Executed);
        assert_eq!(action.approved_by.as_deref(), Some("carol"));
        assert_eq!(
            action.result,
            Some(json!({"key": "OPS-1", "status": "created"}))
        );
        assert_eq!(agent.calls(), 1);

        let events = store.events();
        let history = action_status_history(&events, ids[0].as_str());
        let states: Vec<ActionStatus> = history.iter().map(|h| h.state).collect();
        assert_eq!(
            states,
            vec![
                ActionStatus::Pending,
                ActionStatus::Approved,
                ActionStatus::Executed
            ]
        );
        assert!(is_legal_action_history(&history));
        assert_eq!(history[1].actor, "user:carol");
        assert!(
            events
                .iter()
                .any(|e| e.details.get("signature") == Some(&json!("sig-123")))
        );
    }

    #[tokio::test]
    async fn test_reject_never_executes() {
        let (_, gate, ids, agent) = setup(created()).await;
        let action = gate
            .resolve(&ids[0], false, &ActorSignature::new("carol"))
            .await
            .unwrap();
        assert_eq!(action.status, ActionStatus::Rejected);
        assert_eq!(agent.calls(), 0);

        let err = gate
            .resolve(&ids[0], true, &ActorSignature::new("carol"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApprovalError::ActionStateConflict { ref status, .. } if status == "rejected"
        ));
    }

    #[tokio::test]
    async fn test_execution_failure_is_recorded_without_retry() {
        let (store, gate, ids, agent) = setup(ScriptedAgent::new(
            AgentType::Action,
            vec![Err(AgentError::UpstreamUnavailable("jira down".into()))],
        ))
        .await;

        let action = gate
            .resolve(&ids[0], true, &ActorSignature::new("carol"))
            .await
            .unwrap();
        assert_eq!(action.status, ActionStatus::ExecutionFailed);
        assert!(action.result.is_some_and(|r| r["error"]
            .as_str()
            .is_some_and(|e| e.contains("jira down"))));
        assert_eq!(agent.calls(), 1);
        assert_eq!(store.tasks().len(), 1);
    }

    #[tokio::test]
    async fn test_connector_failure_status_is_execution_failed() {
        let (store, gate, ids, agent) = setup(ScriptedAgent::always(
            AgentType::Action,
            AgentOutput::Action(ActionOutput {
                status: "failed".to_string(),
                result: json!({"status": "failed", "error": "jira rejected the ticket"}),
            }),
        ))
        .await;

        let action = gate
            .resolve(&ids[0], true, &ActorSignature::new("carol"))
            .await
            .unwrap();
        assert_eq!(action.status, ActionStatus::ExecutionFailed);
        assert_eq!(
            action.result,
            Some(json!({"error": "jira rejected the ticket"}))
        );
        assert_eq!(agent.calls(), 1);

        let tasks = store.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, attest_domain::TaskStatus::Failed);

        let history = action_status_history(&store.events(), ids[0].as_str());
        let states: Vec<ActionStatus> = history.iter().map(|h| h.state).collect();
        assert_eq!(
            states,
            vec![
                ActionStatus::Pending,
                ActionStatus::Approved,
                ActionStatus::ExecutionFailed
            ]
        );
    }

    #[tokio::test]
    async fn test_concurrent_resolve_has_one_winner() {
        let (_, gate, ids, agent) = setup(created()).await;
        let attempts = (0..8).map(|i| {
            let gate = gate.clone();
            let id = ids[0].clone();
            async move {
                gate.resolve(&id, i % 2 == 0, &ActorSignature::new("carol"))
                    .await
            }
        });
        let results = futures::future::join_all(attempts).await;

        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(results.iter().filter_map(|r| r.as_ref().err()).all(|e| {
            matches!(e, ApprovalError::ActionStateConflict { .. })
        }));
        assert!(agent.calls() <= 1);
    }

    #[tokio::test]
    async fn test_list_pending_is_scoped_and_idempotent() {
        let (store, gate, _, _) = setup(created()).await;
        let before = store.events().len();

        let all = gate.list_pending("carol").await.unwrap();
        assert_eq!(all.len(), 2);
        let own = gate.list_pending("alice").await.unwrap();
        assert_eq!(own.len(), 1);
        assert_eq!(gate.list_pending("alice").await.unwrap(), own);
        assert!(gate.list_pending("mallory").await.unwrap().is_empty());

        assert_eq!(store.events().len(), before);
    }
}
