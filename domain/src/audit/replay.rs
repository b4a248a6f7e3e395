//! Rebuild entity histories from audit events alone.

use crate::action::ActionStatus;
use crate::audit::entities::AuditEvent;
use crate::request::RequestPhase;
use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;

/// One reconstructed state of an entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry<S> {
    pub state: S,
    pub actor: String,
    pub sequence: i64,
}

fn history<'a, S: FromStr>(
    events: impl IntoIterator<Item = &'a AuditEvent>,
    entity: &str,
    entity_id: &str,
    field: &str,
) -> Vec<HistoryEntry<S>> {
    events
        .into_iter()
        .filter(|e| e.entity() == Some(entity) && e.entity_id() == Some(entity_id))
        .filter_map(|e| {
            let state = e
                .after()
                .and_then(|after| after.get(field))
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())?;
            Some(HistoryEntry {
                state,
                actor: e.actor.to_string(),
                sequence: e.sequence,
            })
        })
        .collect()
}

/// Status sequence of a pending action, in ledger order.
pub fn action_status_history<'a>(
    events: impl IntoIterator<Item = &'a AuditEvent>,
    action_id: &str,
) -> Vec<HistoryEntry<ActionStatus>> {
    history(events, "pending_action", action_id, "status")
}

/// Phase sequence of a request, in ledger order.
pub fn request_phase_history<'a>(
    events: impl IntoIterator<Item = &'a AuditEvent>,
    request_id: &str,
) -> Vec<HistoryEntry<RequestPhase>> {
    history(events, "request", request_id, "phase")
}

/// Whether a replayed action history is one of the legal lifecycles.
pub fn is_legal_action_history(history: &[HistoryEntry<ActionStatus>]) -> bool {
    let Some(first) = history.first() else {
        return true;
    };
    first.state == ActionStatus::Pending
        && history
            .windows(2)
            .all(|w| w[0].state.can_transition_to(w[1].state))
}
