//! In-memory store and scripted agents shared by the use case tests.

use crate::ports::agent::{Agent, AgentError};
use crate::ports::ledger::AuditLedger;
use crate::ports::store::{ActionQuery, PersistentStore, StoreError};
use async_trait::async_trait;
use attest_domain::audit::GENESIS_HASH;
use attest_domain::{
    ActionId, ActionStatus, ActionTransition, Actor, AgentInput, AgentOutput, AgentType,
    AuditEvent, AuditFilter, ChainVerification, ChainVerifier, Document, DocumentId, EventType,
    NewAuditEvent, Passage, PassageId, PendingAction, Request, RequestId, RequestTransition, Task,
    TaskId, TaskTransition,
};
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct State {
    documents: HashMap<DocumentId, Document>,
    passages: Vec<Passage>,
    requests: HashMap<RequestId, Request>,
    tasks: Vec<Task>,
    actions: Vec<PendingAction>,
    events: Vec<AuditEvent>,
}

impl State {
    fn record(&mut self, event: NewAuditEvent) -> AuditEvent {
        let request_sequence = event.request_id.as_ref().map(|r| {
            self.events
                .iter()
                .filter(|e| e.request_id.as_ref() == Some(r))
                .count() as u64
                + 1
        });
        let prev = self
            .events
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        let mut sealed = event.seal(request_sequence, &prev, Utc::now());
        sealed.sequence = self.events.len() as i64 + 1;
        self.events.push(sealed.clone());
        sealed
    }
}

/// Store and ledger backed by plain collections.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.state.lock().unwrap().tasks.clone()
    }

    pub fn actions(&self) -> Vec<PendingAction> {
        self.state.lock().unwrap().actions.clone()
    }

    /// Flip one byte of a stored event, bypassing the append-only contract.
    pub fn tamper(&self, index: usize) {
        let mut state = self.state.lock().unwrap();
        state.events[index].details = serde_json::json!({"tampered": true});
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn insert_document(
        &self,
        document: &Document,
        passages: &[Passage],
        actor: Actor,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.documents.insert(document.id.clone(), document.clone());
        state.passages.extend(passages.iter().cloned());
        let event = NewAuditEvent::transition::<Document>(
            EventType::DocumentIngested,
            actor,
            "document",
            document.id.as_str(),
            None,
            document,
        )?
        .with_detail("passages", Value::from(passages.len()));
        state.record(event);
        Ok(())
    }

    async fn get_document(&self, id: &DocumentId) -> Result<Option<Document>, StoreError> {
        Ok(self.state.lock().unwrap().documents.get(id).cloned())
    }

    async fn list_passages(&self, doc_id: &DocumentId) -> Result<Vec<Passage>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut passages: Vec<Passage> = state
            .passages
            .iter()
            .filter(|p| &p.doc_id == doc_id)
            .cloned()
            .collect();
        passages.sort_by_key(|p| p.index);
        Ok(passages)
    }

    async fn get_passages(&self, ids: &[PassageId]) -> Result<Vec<Passage>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| state.passages.iter().find(|p| &p.id == id).cloned())
            .collect())
    }

    async fn delete_document(&self, id: &DocumentId, actor: Actor) -> Result<Document, StoreError> {
        let mut state = self.state.lock().unwrap();
        let document = state
            .documents
            .remove(id)
            .ok_or_else(|| StoreError::not_found("document", id))?;
        state.passages.retain(|p| &p.doc_id != id);
        let event = NewAuditEvent::new(
            EventType::DocumentDeleted,
            actor,
            serde_json::json!({
                "version": 1,
                "entity": "document",
                "entity_id": id.as_str(),
            }),
        );
        state.record(event);
        Ok(document)
    }

    async fn insert_request(&self, request: &Request, actor: Actor) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.requests.insert(request.id.clone(), request.clone());
        let event = NewAuditEvent::transition::<Request>(
            EventType::RequestCreated,
            actor,
            "request",
            request.id.as_str(),
            None,
            request,
        )?
        .for_request(request.id.clone());
        state.record(event);
        Ok(())
    }

    async fn transition_request(
        &self,
        id: &RequestId,
        transition: RequestTransition,
        actor: Actor,
    ) -> Result<Request, StoreError> {
        let mut state = self.state.lock().unwrap();
        let current = state
            .requests
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("request", id))?;
        let next = current.apply(&transition, Utc::now())?;
        state.requests.insert(id.clone(), next.clone());
        let event = NewAuditEvent::transition(
            transition.event_type(),
            actor,
            "request",
            id.as_str(),
            Some(&current),
            &next,
        )?
        .for_request(id.clone());
        state.record(event);
        Ok(next)
    }

    async fn get_request(&self, id: &RequestId) -> Result<Option<Request>, StoreError> {
        Ok(self.state.lock().unwrap().requests.get(id).cloned())
    }

    async fn list_active_requests(&self) -> Result<Vec<Request>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut active: Vec<Request> = state
            .requests
            .values()
            .filter(|r| !r.status.is_terminal())
            .cloned()
            .collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(active)
    }

    async fn insert_task(&self, task: &Task, actor: Actor) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.tasks.push(task.clone());
        let event = NewAuditEvent::transition::<Task>(
            EventType::TaskCreated,
            actor,
            "task",
            task.id.as_str(),
            None,
            task,
        )?
        .for_request(task.request_id.clone())
        .for_task(task.id.clone());
        state.record(event);
        Ok(())
    }

    async fn transition_task(
        &self,
        id: &TaskId,
        transition: TaskTransition,
        actor: Actor,
    ) -> Result<Task, StoreError> {
        let mut state = self.state.lock().unwrap();
        let position = state
            .tasks
            .iter()
            .position(|t| &t.id == id)
            .ok_or_else(|| StoreError::not_found("task", id))?;
        let current = state.tasks[position].clone();
        let next = current.apply(&transition, Utc::now())?;
        state.tasks[position] = next.clone();
        let event = NewAuditEvent::transition(
            transition.event_type(),
            actor,
            "task",
            id.as_str(),
            Some(&current),
            &next,
        )?
        .for_request(next.request_id.clone())
        .for_task(id.clone());
        state.record(event);
        Ok(next)
    }

    async fn list_tasks(&self, request_id: &RequestId) -> Result<Vec<Task>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tasks
            .iter()
            .filter(|t| &t.request_id == request_id)
            .cloned()
            .collect())
    }

    async fn insert_actions(
        &self,
        actions: &[PendingAction],
        actor: Actor,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        for action in actions {
            state.actions.push(action.clone());
            let event = NewAuditEvent::transition::<PendingAction>(
                EventType::ActionProposed,
                actor.clone(),
                "pending_action",
                action.id.as_str(),
                None,
                action,
            )?
            .for_request(action.request_id.clone());
            state.record(event);
        }
        Ok(())
    }

    async fn transition_action(
        &self,
        id: &ActionId,
        expected: ActionStatus,
        transition: ActionTransition,
        actor: Actor,
        extra: Option<Value>,
    ) -> Result<PendingAction, StoreError> {
        let mut state = self.state.lock().unwrap();
        let position = state
            .actions
            .iter()
            .position(|a| &a.id == id)
            .ok_or_else(|| StoreError::not_found("pending_action", id))?;
        let current = state.actions[position].clone();
        if current.status != expected {
            return Err(StoreError::Conflict {
                entity: "pending_action",
                id: id.to_string(),
                expected: expected.to_string(),
                actual: current.status.to_string(),
            });
        }
        let next = current.apply(&transition, Utc::now())?;
        state.actions[position] = next.clone();
        let mut event = NewAuditEvent::transition(
            transition.event_type(),
            actor,
            "pending_action",
            id.as_str(),
            Some(&current),
            &next,
        )?
        .for_request(next.request_id.clone());
        if let Some(Value::Object(extra)) = extra {
            for (key, value) in extra {
                event = event.with_detail(&key, value);
            }
        }
        state.record(event);
        Ok(next)
    }

    async fn get_action(&self, id: &ActionId) -> Result<Option<PendingAction>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.actions.iter().find(|a| &a.id == id).cloned())
    }

    async fn list_actions(&self, query: &ActionQuery) -> Result<Vec<PendingAction>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .actions
            .iter()
            .filter(|a| query.status.is_none_or(|s| a.status == s))
            .filter(|a| query.request_id.as_ref().is_none_or(|r| &a.request_id == r))
            .filter(|a| {
                query.request_owner.as_ref().is_none_or(|owner| {
                    state
                        .requests
                        .get(&a.request_id)
                        .is_some_and(|r| &r.user_id == owner)
                })
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AuditLedger for MemoryStore {
    async fn append(&self, event: NewAuditEvent) -> Result<AuditEvent, StoreError> {
        Ok(self.state.lock().unwrap().record(event))
    }

    fn query(&self, filter: AuditFilter) -> BoxStream<'_, Result<AuditEvent, StoreError>> {
        let events: Vec<Result<AuditEvent, StoreError>> = self
            .events()
            .into_iter()
            .filter(|e| filter.matches(e))
            .map(Ok)
            .collect();
        stream::iter(events).boxed()
    }

    async fn verify_chain(&self) -> Result<ChainVerification, StoreError> {
        let mut verifier = ChainVerifier::new();
        for event in self.events() {
            if let Err(broken) = verifier.push(&event) {
                return Ok(verifier.finish(Some(broken)));
            }
        }
        Ok(verifier.finish(None))
    }
}

/// Agent replaying a fixed script of responses; the last one repeats.
pub struct ScriptedAgent {
    agent_type: AgentType,
    script: Mutex<VecDeque<Result<AgentOutput, AgentError>>>,
    last: Mutex<Option<Result<AgentOutput, AgentError>>>,
    inputs: Mutex<Vec<AgentInput>>,
    delay: Duration,
}

impl ScriptedAgent {
    pub fn new(agent_type: AgentType, script: Vec<Result<AgentOutput, AgentError>>) -> Self {
        Self {
            agent_type,
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            inputs: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    pub fn always(agent_type: AgentType, output: AgentOutput) -> Self {
        Self::new(agent_type, vec![Ok(output)])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn inputs(&self) -> Vec<AgentInput> {
        self.inputs.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.inputs.lock().unwrap().len()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn agent_type(&self) -> AgentType {
        self.agent_type
    }

    async fn execute(&self, input: AgentInput) -> Result<AgentOutput, AgentError> {
        self.inputs.lock().unwrap().push(input);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(response) => {
                *last = Some(response.clone());
                response
            }
            None => last
                .clone()
                .unwrap_or_else(|| Err(AgentError::invalid_output("script exhausted"))),
        }
    }
}

pub fn passage(doc: &str, id: &str, page: u32, text: &str) -> Passage {
    Passage {
        id: PassageId::new(id),
        doc_id: DocumentId::new(doc),
        index: 0,
        text: text.to_string(),
        char_start: 0,
        char_end: text.len() as u64,
        page: Some(page),
        metadata: Default::default(),
    }
}

/// Citation token for a passage built by [`passage`].
pub fn cite(passage: &Passage) -> String {
    attest_domain::CitationToken::new(passage.doc_id.clone(), passage.page, passage.id.clone())
        .render()
}
