use super::*;
use crate::config::{CitationPolicy, FabricConfig, RetryPolicy};
use crate::ports::agent::{AgentError, AgentRegistry};
use crate::testing::{MemoryStore, ScriptedAgent, cite, passage};
use attest_domain::audit::request_phase_history;
use attest_domain::{
    ActionStatus, AgentInput, AgentOutput, AgentType, DecisionOutput, Document, EventType,
    Passage, PlanStep, PlannerOutput, ProposedAction, RankedPassage, RequestStatus,
    RetrieverOutput, SummarizerOutput, TaskStatus,
};
use serde_json::json;
use std::time::Duration;

// ==================== Fixtures ====================

fn passages() -> Vec<Passage> {
    vec![
        passage("d1", "p1", 3, "Login failures spiked after the 2.4 deploy."),
        passage("d1", "p2", 4, "Rollback restored logins within an hour."),
    ]
}

fn ranked(ids: &[&str]) -> AgentOutput {
    AgentOutput::Retriever(RetrieverOutput {
        passages: ids
            .iter()
            .enumerate()
            .map(|(i, id)| RankedPassage {
                passage_id: PassageId::new(*id),
                score: 1.0 / (60.0 + i as f64 + 1.0),
                vector_score: Some(0.9),
                vector_rank: Some(i + 1),
                lexical_rank: None,
            })
            .collect(),
    })
}

fn plan(steps: Vec<PlanStep>) -> AgentOutput {
    AgentOutput::Planner(PlannerOutput { steps })
}

fn summary(text: &str, citations: Vec<String>) -> AgentOutput {
    AgentOutput::Summarizer(SummarizerOutput {
        summary_text: text.to_string(),
        citations,
    })
}

fn decision(actions: Vec<ProposedAction>) -> AgentOutput {
    AgentOutput::Decision(DecisionOutput { actions })
}

fn jira_ticket() -> ProposedAction {
    ProposedAction::new(
        "create_ticket",
        "jira",
        json!({"summary": "Investigate login failures"}),
    )
}

struct Harness {
    store: Arc<MemoryStore>,
    orchestrator: Arc<RequestOrchestrator>,
    summarizer: Arc<ScriptedAgent>,
    retriever: Arc<ScriptedAgent>,
}

async fn harness(
    planner: ScriptedAgent,
    retriever: ScriptedAgent,
    summarizer: ScriptedAgent,
    decider: ScriptedAgent,
    config: OrchestratorConfig,
) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let document = Document::new("incidents.pdf", "application/pdf", "alice");
    store
        .insert_document(&document, &passages(), Actor::user("alice"))
        .await
        .unwrap();

    let retriever = Arc::new(retriever);
    let summarizer = Arc::new(summarizer);
    let registry = AgentRegistry::new()
        .register(Arc::new(planner))
        .register(retriever.clone())
        .register(summarizer.clone())
        .register(Arc::new(decider));
    let fabric = Arc::new(TaskFabric::start(&registry, &FabricConfig::default()));
    let orchestrator = Arc::new(RequestOrchestrator::new(store.clone(), fabric, config));
    Harness {
        store,
        orchestrator,
        summarizer,
        retriever,
    }
}

fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig::default()
        .with_agent_timeout(Duration::from_secs(5))
        .with_retry(RetryPolicy::default().with_initial_backoff(Duration::from_millis(1)))
}

async fn default_harness(summarizer: ScriptedAgent, config: OrchestratorConfig) -> Harness {
    harness(
        ScriptedAgent::always(
            AgentType::Planner,
            plan(vec![PlanStep::new("login failures", "Summarize login incidents")]),
        ),
        ScriptedAgent::always(AgentType::Retriever, ranked(&["p1", "p2"])),
        summarizer,
        ScriptedAgent::always(AgentType::Decision, decision(vec![jira_ticket()])),
        config,
    )
    .await
}

fn grounded_summarizer() -> ScriptedAgent {
    let fixtures = passages();
    let p1 = &fixtures[0];
    ScriptedAgent::always(
        AgentType::Summarizer,
        summary(
            &format!("Logins failed after the deploy {}.", cite(p1)),
            vec![cite(p1)],
        ),
    )
}

// ==================== Tests ====================

#[tokio::test]
async fn test_happy_path_completes_with_pending_action() {
    let h = default_harness(grounded_summarizer(), fast_config()).await;

    let response = h
        .orchestrator
        .submit(SubmitQueryInput::new("alice", "Summarize login incidents"))
        .await
        .unwrap();

    assert!(response.verified);
    assert_eq!(response.citations.len(), 1);
    assert_eq!(response.citations[0].passage_id, PassageId::new("p1"));
    assert_eq!(response.citations[0].page, Some(3));
    assert_eq!(response.pending_action_ids.len(), 1);

    let actions = h.store.actions();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].status, ActionStatus::Pending);

    let tasks = h.store.tasks();
    assert_eq!(tasks.len(), 4);
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Succeeded));

    let events = h.store.events();
    let phases: Vec<RequestPhase> = request_phase_history(&events, response.request_id.as_str())
        .into_iter()
        .map(|e| e.state)
        .collect();
    assert_eq!(
        phases,
        vec![
            RequestPhase::Created,
            RequestPhase::Planning,
            RequestPhase::Retrieving,
            RequestPhase::Summarizing,
            RequestPhase::Deciding,
            RequestPhase::Acting,
            RequestPhase::Finalizing,
            RequestPhase::Completed,
        ]
    );
    assert!(
        events
            .iter()
            .any(|e| e.event_type == EventType::ActionProposed && e.actor == Actor::agent("decision"))
    );
}

#[tokio::test]
async fn test_summarizer_only_sees_retrieved_passages() {
    let h = default_harness(grounded_summarizer(), fast_config()).await;
    h.orchestrator
        .submit(SubmitQueryInput::new("alice", "Summarize login incidents"))
        .await
        .unwrap();

    let inputs = h.summarizer.inputs();
    let AgentInput::Summarizer(input) = &inputs[0] else {
        panic!("expected summarizer input");
    };
    assert_eq!(
        input.allowed_passage_ids(),
        vec![PassageId::new("p1"), PassageId::new("p2")]
    );
}

#[tokio::test]
async fn test_citation_mismatch_degrades_after_one_correction() {
    let bogus = "[cite:d1|9|p9]".to_string();
    let h = default_harness(
        ScriptedAgent::always(
            AgentType::Summarizer,
            summary("Logins failed.", vec![bogus.clone()]),
        ),
        fast_config(),
    )
    .await;

    let response = h
        .orchestrator
        .submit(SubmitQueryInput::new("alice", "Summarize login incidents"))
        .await
        .unwrap();

    assert!(!response.verified);
    assert_eq!(response.unverified_citations, vec![bogus]);
    assert!(response.citations.is_empty());
    assert_eq!(h.summarizer.calls(), 2);

    let inputs = h.summarizer.inputs();
    let AgentInput::Summarizer(corrected) = &inputs[1] else {
        panic!("expected summarizer input");
    };
    assert!(
        corrected
            .correction
            .as_deref()
            .is_some_and(|c| c.contains("p1, p2"))
    );

    let failed = h
        .store
        .tasks()
        .into_iter()
        .filter(|t| t.failure_reason == Some(FailureReason::CitationMismatch))
        .count();
    assert_eq!(failed, 2);
}

#[tokio::test]
async fn test_citation_mismatch_fails_under_strict_policy() {
    let h = default_harness(
        ScriptedAgent::always(
            AgentType::Summarizer,
            summary("Logins failed.", vec!["[cite:d1|9|p9]".to_string()]),
        ),
        fast_config().with_citation_policy(CitationPolicy::Fail),
    )
    .await;

    let err = h
        .orchestrator
        .submit(SubmitQueryInput::new("alice", "Summarize login incidents"))
        .await
        .unwrap_err();

    let failure = err.failure().unwrap();
    assert_eq!(failure.reason, FailureReason::CitationMismatch);
    assert_eq!(failure.stage, Some(AgentType::Summarizer));
    assert!(h.store.actions().is_empty());
}

#[tokio::test]
async fn test_corrected_summary_is_accepted() {
    let fixtures = passages();
    let p1 = &fixtures[0];
    let h = default_harness(
        ScriptedAgent::new(
            AgentType::Summarizer,
            vec![
                Ok(summary("Bad.", vec!["[cite:d1|9|p9]".to_string()])),
                Ok(summary("Good.", vec![cite(p1)])),
            ],
        ),
        fast_config(),
    )
    .await;

    let response = h
        .orchestrator
        .submit(SubmitQueryInput::new("alice", "Summarize login incidents"))
        .await
        .unwrap();
    assert!(response.verified);
    assert_eq!(response.summary, "Good.");
}

#[tokio::test]
async fn test_transient_failure_is_retried_as_new_task() {
    let h = harness(
        ScriptedAgent::always(
            AgentType::Planner,
            plan(vec![PlanStep::new("login", "Summarize")]),
        ),
        ScriptedAgent::new(
            AgentType::Retriever,
            vec![
                Err(AgentError::UpstreamUnavailable("503".into())),
                Ok(ranked(&["p1"])),
            ],
        ),
        grounded_summarizer(),
        ScriptedAgent::always(AgentType::Decision, decision(vec![])),
        fast_config(),
    )
    .await;

    h.orchestrator
        .submit(SubmitQueryInput::new("alice", "Summarize login incidents"))
        .await
        .unwrap();

    let retrievals: Vec<_> = h
        .store
        .tasks()
        .into_iter()
        .filter(|t| t.agent_type == AgentType::Retriever)
        .collect();
    assert_eq!(retrievals.len(), 2);
    assert_eq!(retrievals[0].status, TaskStatus::Failed);
    assert_eq!(retrievals[0].attempt, 1);
    assert_eq!(retrievals[1].status, TaskStatus::Succeeded);
    assert_eq!(retrievals[1].attempt, 2);
    assert_eq!(retrievals[0].step_index, retrievals[1].step_index);
}

#[tokio::test]
async fn test_exhausted_retries_fail_the_request() {
    let h = harness(
        ScriptedAgent::always(
            AgentType::Planner,
            plan(vec![PlanStep::new("login", "Summarize")]),
        ),
        ScriptedAgent::new(
            AgentType::Retriever,
            vec![Err(AgentError::UpstreamUnavailable("503".into()))],
        ),
        grounded_summarizer(),
        ScriptedAgent::always(AgentType::Decision, decision(vec![])),
        fast_config(),
    )
    .await;

    let err = h
        .orchestrator
        .submit(SubmitQueryInput::new("alice", "Summarize login incidents"))
        .await
        .unwrap_err();

    let failure = err.failure().unwrap().clone();
    assert_eq!(failure.reason, FailureReason::UpstreamUnavailable);
    assert_eq!(failure.stage, Some(AgentType::Retriever));
    assert_eq!(h.retriever.calls(), 3);

    let OrchestratorError::RequestFailed { request_id, .. } = err else {
        panic!("expected request failure");
    };
    let record = h.store.get_request(&request_id).await.unwrap().unwrap();
    assert_eq!(record.status, RequestStatus::Failed);
    assert_eq!(
        record.failure.as_ref().and_then(|f| f.task_id.clone()),
        failure.task_id
    );
}

#[tokio::test]
async fn test_empty_plan_is_invalid_output() {
    let h = harness(
        ScriptedAgent::always(AgentType::Planner, plan(vec![])),
        ScriptedAgent::always(AgentType::Retriever, ranked(&["p1"])),
        grounded_summarizer(),
        ScriptedAgent::always(AgentType::Decision, decision(vec![])),
        fast_config(),
    )
    .await;

    let err = h
        .orchestrator
        .submit(SubmitQueryInput::new("alice", "Summarize login incidents"))
        .await
        .unwrap_err();
    assert_eq!(err.failure().unwrap().reason, FailureReason::InvalidOutput);
    // one corrective attempt, then give up
    let planner_tasks = h
        .store
        .tasks()
        .into_iter()
        .filter(|t| t.agent_type == AgentType::Planner)
        .count();
    assert_eq!(planner_tasks, 2);
}

#[tokio::test]
async fn test_empty_query_is_rejected() {
    let h = default_harness(grounded_summarizer(), fast_config()).await;
    let err = h
        .orchestrator
        .submit(SubmitQueryInput::new("alice", "   "))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::EmptyQuery));
}

#[tokio::test]
async fn test_dependent_steps_receive_prior_summaries() {
    let h = harness(
        ScriptedAgent::always(
            AgentType::Planner,
            plan(vec![
                PlanStep::new("login failures", "What failed"),
                PlanStep::new("rollback", "How it was fixed"),
            ]),
        ),
        ScriptedAgent::always(AgentType::Retriever, ranked(&["p1", "p2"])),
        grounded_summarizer(),
        ScriptedAgent::always(AgentType::Decision, decision(vec![])),
        fast_config(),
    )
    .await;

    let response = h
        .orchestrator
        .submit(SubmitQueryInput::new("alice", "Summarize login incidents"))
        .await
        .unwrap();

    assert_eq!(response.steps.len(), 2);
    // same passage cited in both steps is listed once
    assert_eq!(response.citations.len(), 1);
    let inputs = h.summarizer.inputs();
    let AgentInput::Summarizer(second) = &inputs[1] else {
        panic!("expected summarizer input");
    };
    assert_eq!(second.prior_summaries.len(), 1);
}

#[tokio::test]
async fn test_independent_steps_run_in_parallel() {
    let h = harness(
        ScriptedAgent::always(
            AgentType::Planner,
            plan(vec![
                PlanStep::new("login failures", "What failed").independent(),
                PlanStep::new("rollback", "How it was fixed").independent(),
            ]),
        ),
        ScriptedAgent::always(AgentType::Retriever, ranked(&["p1", "p2"]))
            .with_delay(Duration::from_millis(50)),
        grounded_summarizer(),
        ScriptedAgent::always(AgentType::Decision, decision(vec![jira_ticket()])),
        fast_config().with_parallel_independent_steps(true),
    )
    .await;

    let response = h
        .orchestrator
        .submit(SubmitQueryInput::new("alice", "Summarize login incidents"))
        .await
        .unwrap();

    let indices: Vec<u32> = response.steps.iter().map(|s| s.index).collect();
    assert_eq!(indices, vec![0, 1]);
    assert_eq!(response.pending_action_ids.len(), 2);
    let inputs = h.summarizer.inputs();
    assert!(inputs.iter().all(|i| match i {
        AgentInput::Summarizer(s) => s.prior_summaries.is_empty(),
        _ => false,
    }));
}

#[tokio::test]
async fn test_cancel_stops_a_live_request() {
    let h = harness(
        ScriptedAgent::always(
            AgentType::Planner,
            plan(vec![PlanStep::new("login", "Summarize")]),
        )
        .with_delay(Duration::from_secs(5)),
        ScriptedAgent::always(AgentType::Retriever, ranked(&["p1"])),
        grounded_summarizer(),
        ScriptedAgent::always(AgentType::Decision, decision(vec![])),
        fast_config(),
    )
    .await;

    let orchestrator = h.orchestrator.clone();
    let running = tokio::spawn(async move {
        orchestrator
            .submit(SubmitQueryInput::new("alice", "Summarize login incidents"))
            .await
    });

    // wait for the request to show up
    let request_id = loop {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if let Some(r) = h.store.list_active_requests().await.unwrap().first() {
            break r.id.clone();
        }
    };

    let unauthorized = h.orchestrator.cancel(&request_id, "mallory").await;
    assert!(matches!(
        unauthorized,
        Err(OrchestratorError::Unauthorized { .. })
    ));

    let cancelled = h.orchestrator.cancel(&request_id, "alice").await.unwrap();
    assert_eq!(cancelled.status, RequestStatus::Failed);

    let err = running.await.unwrap().unwrap_err();
    let failure = err.failure().unwrap();
    assert_eq!(failure.reason, FailureReason::Cancelled);
    assert_eq!(failure.message, "cancelled by user:alice");
    assert!(!h.orchestrator.handles().is_live(&request_id));

    let again = h.orchestrator.cancel(&request_id, "alice").await;
    assert!(matches!(
        again,
        Err(OrchestratorError::AlreadyTerminal { .. })
    ));
}

#[tokio::test]
async fn test_recover_orphans_fails_abandoned_requests() {
    let h = default_harness(grounded_summarizer(), fast_config()).await;

    // A request left mid-flight by a process that no longer exists
    let request = Request::new("alice", "Summarize login incidents");
    h.store
        .insert_request(&request, Actor::user("alice"))
        .await
        .unwrap();
    h.store
        .transition_request(
            &request.id,
            RequestTransition::enter(RequestPhase::Planning),
            Actor::System,
        )
        .await
        .unwrap();
    let task = attest_domain::Task::new(
        request.id.clone(),
        AgentType::Planner,
        None,
        1,
        json!({}),
    );
    h.store.insert_task(&task, Actor::System).await.unwrap();

    let report = h.orchestrator.recover_orphans().await.unwrap();
    assert_eq!(report.requests, vec![request.id.clone()]);
    assert_eq!(report.tasks, 1);

    let record = h.store.get_request(&request.id).await.unwrap().unwrap();
    assert_eq!(
        record.failure.map(|f| f.reason),
        Some(FailureReason::Orphaned)
    );
    let tasks = h.store.list_tasks(&request.id).await.unwrap();
    assert_eq!(tasks[0].failure_reason, Some(FailureReason::Orphaned));

    assert!(h.orchestrator.recover_orphans().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_recover_orphans_fails_approved_action_without_outcome() {
    let h = default_harness(grounded_summarizer(), fast_config()).await;
    let response = h
        .orchestrator
        .submit(SubmitQueryInput::new("alice", "Summarize login incidents"))
        .await
        .unwrap();
    let action_id = response.pending_action_ids[0].clone();

    // Approved, with its action task started, then the process went away
    h.store
        .transition_action(
            &action_id,
            ActionStatus::Pending,
            attest_domain::ActionTransition::Approve {
                by: "carol".to_string(),
            },
            Actor::user("carol"),
            None,
        )
        .await
        .unwrap();
    let task = attest_domain::Task::new(
        response.request_id.clone(),
        AgentType::Action,
        None,
        1,
        json!({}),
    );
    h.store.insert_task(&task, Actor::System).await.unwrap();
    h.store
        .transition_task(&task.id, TaskTransition::Start, Actor::System)
        .await
        .unwrap();

    let report = h.orchestrator.recover_orphans().await.unwrap();
    assert!(report.requests.is_empty());
    assert_eq!(report.actions, vec![action_id.clone()]);
    assert_eq!(report.tasks, 1);

    let action = h.store.get_action(&action_id).await.unwrap().unwrap();
    assert_eq!(action.status, ActionStatus::ExecutionFailed);
    assert!(action.result.is_some_and(|r| r["error"]
        .as_str()
        .is_some_and(|e| e.starts_with("orphaned"))));

    let tasks = h.store.list_tasks(&response.request_id).await.unwrap();
    let action_task = tasks.iter().find(|t| t.id == task.id).unwrap();
    assert_eq!(action_task.failure_reason, Some(FailureReason::Orphaned));
    assert_eq!(
        tasks.iter().filter(|t| t.status == TaskStatus::Failed).count(),
        1
    );

    assert!(h.orchestrator.recover_orphans().await.unwrap().is_empty());
}

#[test]
fn test_aggregate_dedupes_citations() {
    let p = passages();
    let citation = Citation::from_passage(&p[0], 0.5);
    let step = |index: u32, verified: bool| StepResult {
        index,
        goal: "g".to_string(),
        summary: format!("summary {}", index),
        citations: vec![citation.clone()],
        verified,
        unverified_tokens: if verified {
            vec![]
        } else {
            vec!["[cite:x|-|y]".to_string()]
        },
        action_ids: vec![],
    };

    let output = aggregate(vec![step(0, true), step(1, false)]);
    assert_eq!(output.summary, "summary 0\n\nsummary 1");
    assert_eq!(output.citations.len(), 1);
    assert!(!output.verified);
    assert_eq!(output.unverified_citations, vec!["[cite:x|-|y]".to_string()]);
}
