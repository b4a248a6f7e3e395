//! Audit event types, hash sealing and query filters.

use crate::core::actor::Actor;
use crate::core::error::DomainError;
use crate::core::ids::{EventId, RequestId, TaskId};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Version of the `details` payload layout.
pub const DETAILS_VERSION: u32 = 1;

/// `prev_hash` of the first event in the ledger.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Kind of fact an audit event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RequestCreated,
    RequestPhaseChanged,
    RequestCompleted,
    RequestFailed,
    TaskCreated,
    TaskStarted,
    TaskSucceeded,
    TaskFailed,
    ActionProposed,
    ActionApproved,
    ActionRejected,
    ActionExecuted,
    ActionExecutionFailed,
    DocumentIngested,
    DocumentDeleted,
}

impl EventType {
    pub const ALL: [EventType; 15] = [
        EventType::RequestCreated,
        EventType::RequestPhaseChanged,
        EventType::RequestCompleted,
        EventType::RequestFailed,
        EventType::TaskCreated,
        EventType::TaskStarted,
        EventType::TaskSucceeded,
        EventType::TaskFailed,
        EventType::ActionProposed,
        EventType::ActionApproved,
        EventType::ActionRejected,
        EventType::ActionExecuted,
        EventType::ActionExecutionFailed,
        EventType::DocumentIngested,
        EventType::DocumentDeleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::RequestCreated => "request_created",
            EventType::RequestPhaseChanged => "request_phase_changed",
            EventType::RequestCompleted => "request_completed",
            EventType::RequestFailed => "request_failed",
            EventType::TaskCreated => "task_created",
            EventType::TaskStarted => "task_started",
            EventType::TaskSucceeded => "task_succeeded",
            EventType::TaskFailed => "task_failed",
            EventType::ActionProposed => "action_proposed",
            EventType::ActionApproved => "action_approved",
            EventType::ActionRejected => "action_rejected",
            EventType::ActionExecuted => "action_executed",
            EventType::ActionExecutionFailed => "action_execution_failed",
            EventType::DocumentIngested => "document_ingested",
            EventType::DocumentDeleted => "document_deleted",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| DomainError::invalid_value("event_type", s))
    }
}

/// An event before the ledger assigns it an id, a sequence and a hash.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEvent {
    pub request_id: Option<RequestId>,
    pub task_id: Option<TaskId>,
    pub event_type: EventType,
    pub actor: Actor,
    pub details: Value,
}

impl NewAuditEvent {
    pub fn new(event_type: EventType, actor: Actor, details: Value) -> Self {
        Self {
            request_id: None,
            task_id: None,
            event_type,
            actor,
            details,
        }
    }

    /// Event for an entity state change, carrying full before/after state.
    ///
    /// `before` is `None` for creation events.
    pub fn transition<T: Serialize>(
        event_type: EventType,
        actor: Actor,
        entity: &'static str,
        entity_id: &str,
        before: Option<&T>,
        after: &T,
    ) -> Result<Self, DomainError> {
        let before = match before {
            Some(b) => to_value(entity, b)?,
            None => Value::Null,
        };
        let after = to_value(entity, after)?;
        Ok(Self::new(
            event_type,
            actor,
            json!({
                "version": DETAILS_VERSION,
                "entity": entity,
                "entity_id": entity_id,
                "before": before,
                "after": after,
            }),
        ))
    }

    pub fn for_request(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn for_task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    /// Add a top-level field to the details object.
    pub fn with_detail(mut self, key: &str, value: Value) -> Self {
        if let Value::Object(map) = &mut self.details {
            map.insert(key.to_string(), value);
        }
        self
    }

    /// Turn into a sealed event chained after `prev_hash`.
    pub fn seal(
        self,
        request_sequence: Option<u64>,
        prev_hash: &str,
        now: DateTime<Utc>,
    ) -> AuditEvent {
        let mut event = AuditEvent {
            id: EventId::generate(),
            sequence: 0,
            request_sequence,
            request_id: self.request_id,
            task_id: self.task_id,
            event_type: self.event_type,
            actor: self.actor,
            timestamp: truncate_to_millis(now),
            details: self.details,
            prev_hash: prev_hash.to_string(),
            hash: String::new(),
        };
        event.hash = event.compute_hash();
        event
    }
}

fn to_value<T: Serialize>(entity: &'static str, value: &T) -> Result<Value, DomainError> {
    serde_json::to_value(value).map_err(|_| DomainError::Serialization(entity))
}

fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    let rendered = ts.to_rfc3339_opts(SecondsFormat::Millis, true);
    DateTime::parse_from_rfc3339(&rendered)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(ts)
}

/// Render a timestamp the way the ledger stores and hashes it.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// An immutable, sealed audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: EventId,
    /// Global insertion order, assigned by the ledger
    pub sequence: i64,
    /// Monotonic position within the request's own events
    pub request_sequence: Option<u64>,
    pub request_id: Option<RequestId>,
    pub task_id: Option<TaskId>,
    pub event_type: EventType,
    pub actor: Actor,
    pub timestamp: DateTime<Utc>,
    pub details: Value,
    pub prev_hash: String,
    pub hash: String,
}

impl AuditEvent {
    /// SHA-256 over the canonical JSON of everything except `sequence`
    /// and `hash` itself.
    pub fn compute_hash(&self) -> String {
        let material = json!({
            "id": self.id,
            "request_sequence": self.request_sequence,
            "request_id": self.request_id,
            "task_id": self.task_id,
            "event_type": self.event_type.as_str(),
            "actor": self.actor.to_string(),
            "timestamp": format_timestamp(&self.timestamp),
            "details": self.details,
            "prev_hash": self.prev_hash,
        });
        let bytes = serde_json::to_vec(&material).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        hex::encode(hasher.finalize())
    }

    pub fn entity(&self) -> Option<&str> {
        self.details.get("entity").and_then(Value::as_str)
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.details.get("entity_id").and_then(Value::as_str)
    }

    pub fn after(&self) -> Option<&Value> {
        self.details.get("after").filter(|v| !v.is_null())
    }
}

/// Filters for ledger queries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditFilter {
    pub request_id: Option<RequestId>,
    pub task_id: Option<TaskId>,
    pub event_type: Option<EventType>,
    pub actor: Option<Actor>,
    /// Inclusive lower bound
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound
    pub until: Option<DateTime<Utc>>,
}

impl AuditFilter {
    pub fn for_request(request_id: RequestId) -> Self {
        Self {
            request_id: Some(request_id),
            ..Default::default()
        }
    }

    pub fn with_event_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn between(mut self, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        self.since = since;
        self.until = until;
        self
    }

    pub fn matches(&self, event: &AuditEvent) -> bool {
        self.request_id
            .as_ref()
            .is_none_or(|r| event.request_id.as_ref() == Some(r))
            && self
                .task_id
                .as_ref()
                .is_none_or(|t| event.task_id.as_ref() == Some(t))
            && self.event_type.is_none_or(|e| event.event_type == e)
            && self.actor.as_ref().is_none_or(|a| &event.actor == a)
            && self.since.is_none_or(|s| event.timestamp >= s)
            && self.until.is_none_or(|u| event.timestamp < u)
    }
}

/// First broken link found while walking the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokenLink {
    pub sequence: i64,
    pub event_id: EventId,
    pub reason: String,
}

/// Result of a full chain walk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChainVerification {
    pub checked: u64,
    pub broken: Option<BrokenLink>,
}

impl ChainVerification {
    pub fn is_intact(&self) -> bool {
        self.broken.is_none()
    }
}

/// Incremental chain checker fed events in ledger order.
#[derive(Debug)]
pub struct ChainVerifier {
    expected_prev: String,
    checked: u64,
}

impl Default for ChainVerifier {
    fn default() -> Self {
        Self {
            expected_prev: GENESIS_HASH.to_string(),
            checked: 0,
        }
    }
}

impl ChainVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the next event. Stops being meaningful after the first error.
    pub fn push(&mut self, event: &AuditEvent) -> Result<(), BrokenLink> {
        let broken = |reason: String| BrokenLink {
            sequence: event.sequence,
            event_id: event.id.clone(),
            reason,
        };
        if event.prev_hash != self.expected_prev {
            return Err(broken(format!(
                "prev_hash {} does not match preceding hash {}",
                event.prev_hash, self.expected_prev
            )));
        }
        let recomputed = event.compute_hash();
        if recomputed != event.hash {
            return Err(broken(format!(
                "stored hash {} does not match recomputed {}",
                event.hash, recomputed
            )));
        }
        self.expected_prev = event.hash.clone();
        self.checked += 1;
        Ok(())
    }

    pub fn finish(self, broken: Option<BrokenLink>) -> ChainVerification {
        ChainVerification {
            checked: self.checked,
            broken,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sealed_chain(n: usize) -> Vec<AuditEvent> {
        let mut prev = GENESIS_HASH.to_string();
        (0..n)
            .map(|i| {
                let mut event = NewAuditEvent::new(
                    EventType::RequestPhaseChanged,
                    Actor::System,
                    json!({"version": 1, "i": i}),
                )
                .seal(Some(i as u64 + 1), &prev, Utc::now());
                event.sequence = i as i64 + 1;
                prev = event.hash.clone();
                event
            })
            .collect()
    }

    #[test]
    fn test_event_type_roundtrip() {
        for event_type in EventType::ALL {
            assert_eq!(event_type.as_str().parse::<EventType>().unwrap(), event_type);
        }
        assert!("request_deleted".parse::<EventType>().is_err());
    }

    #[test]
    fn test_transition_details_capture_before_and_after() {
        let event = NewAuditEvent::transition(
            EventType::ActionApproved,
            Actor::user("alice"),
            "pending_action",
            "a1",
            Some(&json!({"status": "pending"})),
            &json!({"status": "approved"}),
        )
        .unwrap();
        assert_eq!(event.details["version"], json!(1));
        assert_eq!(event.details["before"]["status"], json!("pending"));
        assert_eq!(event.details["after"]["status"], json!("approved"));
    }

    #[test]
    fn test_seal_is_deterministic_and_chained() {
        let chain = sealed_chain(3);
        assert_eq!(chain[0].prev_hash, GENESIS_HASH);
        assert_eq!(chain[1].prev_hash, chain[0].hash);
        assert_eq!(chain[0].hash, chain[0].compute_hash());
        assert_eq!(chain[0].hash.len(), 64);
    }

    #[test]
    fn test_verifier_accepts_intact_chain() {
        let mut verifier = ChainVerifier::new();
        for event in &sealed_chain(4) {
            verifier.push(event).unwrap();
        }
        let result = verifier.finish(None);
        assert!(result.is_intact());
        assert_eq!(result.checked, 4);
    }

    #[test]
    fn test_verifier_detects_tampered_details() {
        let mut chain = sealed_chain(3);
        chain[1].details = json!({"version": 1, "i": 99});
        let mut verifier = ChainVerifier::new();
        verifier.push(&chain[0]).unwrap();
        let broken = verifier.push(&chain[1]).unwrap_err();
        assert_eq!(broken.sequence, 2);
        assert!(broken.reason.contains("recomputed"));
    }

    #[test]
    fn test_verifier_detects_removed_event() {
        let mut chain = sealed_chain(3);
        chain.remove(1);
        let mut verifier = ChainVerifier::new();
        verifier.push(&chain[0]).unwrap();
        assert!(verifier.push(&chain[1]).is_err());
    }

    #[test]
    fn test_filter_matches() {
        let event = NewAuditEvent::new(EventType::ActionApproved, Actor::user("alice"), json!({}))
            .for_request(RequestId::new("r1"))
            .seal(Some(1), GENESIS_HASH, Utc::now());

        assert!(AuditFilter::default().matches(&event));
        assert!(AuditFilter::for_request(RequestId::new("r1")).matches(&event));
        assert!(!AuditFilter::for_request(RequestId::new("r2")).matches(&event));
        assert!(
            AuditFilter::default()
                .with_event_type(EventType::ActionApproved)
                .with_actor(Actor::user("alice"))
                .matches(&event)
        );
        assert!(
            !AuditFilter::default()
                .with_actor(Actor::user("bob"))
                .matches(&event)
        );
        let later = event.timestamp + chrono::Duration::seconds(1);
        assert!(
            !AuditFilter::default()
                .between(Some(later), None)
                .matches(&event)
        );
        assert!(
            AuditFilter::default()
                .between(None, Some(later))
                .matches(&event)
        );
    }
}
