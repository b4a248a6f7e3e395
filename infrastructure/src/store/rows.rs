//! Row mapping between SQLite and domain entities.

use attest_application::StoreError;
use attest_domain::{
    Actor, AuditEvent, Document, EventId, Passage, PendingAction, Request, Task,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::str::FromStr;

pub(super) trait DbResultExt<T> {
    fn db(self) -> Result<T, StoreError>;
}

impl<T> DbResultExt<T> for rusqlite::Result<T> {
    fn db(self) -> Result<T, StoreError> {
        self.map_err(|e| StoreError::Database(e.to_string()))
    }
}

pub(super) fn corrupt(what: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(format!("{}: {}", what, e))
}

/// Entity timestamps keep full precision so round trips are lossless.
pub(super) fn ts(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub(super) fn opt_ts(value: &Option<DateTime<Utc>>) -> Option<String> {
    value.as_ref().map(ts)
}

pub(super) fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| corrupt("timestamp", e))
}

fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    raw.as_deref().map(parse_ts).transpose()
}

pub(super) fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| corrupt("json", e))
}

pub(super) fn opt_json<T: Serialize>(value: &Option<T>) -> Result<Option<String>, StoreError> {
    value.as_ref().map(|v| to_json(v)).transpose()
}

fn from_json<T: DeserializeOwned>(what: &str, raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| corrupt(what, e))
}

fn from_opt_json<T: DeserializeOwned>(
    what: &str,
    raw: Option<String>,
) -> Result<Option<T>, StoreError> {
    raw.as_deref().map(|r| from_json(what, r)).transpose()
}

fn parse<T>(what: &str, raw: &str) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e| corrupt(what, e))
}

fn get<T: rusqlite::types::FromSql>(row: &Row<'_>, column: &str) -> Result<T, StoreError> {
    row.get(column).db()
}

pub(super) const DOCUMENT_COLUMNS: &str =
    "id, filename, content_type, storage_key, owner, metadata_json, uploaded_at";

pub(super) fn document(row: &Row<'_>) -> Result<Document, StoreError> {
    Ok(Document {
        id: get::<String>(row, "id")?.into(),
        filename: get(row, "filename")?,
        content_type: get(row, "content_type")?,
        storage_key: get(row, "storage_key")?,
        owner: get(row, "owner")?,
        metadata: from_json("document metadata", &get::<String>(row, "metadata_json")?)?,
        uploaded_at: parse_ts(&get::<String>(row, "uploaded_at")?)?,
    })
}

pub(super) const PASSAGE_COLUMNS: &str =
    "id, doc_id, idx, text, char_start, char_end, page, metadata_json";

pub(super) fn passage(row: &Row<'_>) -> Result<Passage, StoreError> {
    Ok(Passage {
        id: get::<String>(row, "id")?.into(),
        doc_id: get::<String>(row, "doc_id")?.into(),
        index: get(row, "idx")?,
        text: get(row, "text")?,
        char_start: get::<i64>(row, "char_start")? as u64,
        char_end: get::<i64>(row, "char_end")? as u64,
        page: get(row, "page")?,
        metadata: from_json("passage metadata", &get::<String>(row, "metadata_json")?)?,
    })
}

pub(super) const REQUEST_COLUMNS: &str = "id, user_id, query, status, phase, current_step, \
     step_phases_json, output_json, failure_json, created_at, completed_at";

pub(super) fn request(row: &Row<'_>) -> Result<Request, StoreError> {
    Ok(Request {
        id: get::<String>(row, "id")?.into(),
        user_id: get(row, "user_id")?,
        query: get(row, "query")?,
        status: parse("request status", &get::<String>(row, "status")?)?,
        phase: parse("request phase", &get::<String>(row, "phase")?)?,
        current_step: get(row, "current_step")?,
        step_phases: from_json("request step phases", &get::<String>(row, "step_phases_json")?)?,
        output: from_opt_json("request output", get(row, "output_json")?)?,
        failure: from_opt_json("request failure", get(row, "failure_json")?)?,
        created_at: parse_ts(&get::<String>(row, "created_at")?)?,
        completed_at: parse_opt_ts(get(row, "completed_at")?)?,
    })
}

pub(super) const TASK_COLUMNS: &str = "id, request_id, agent_type, step_index, attempt, \
     input_json, output_json, status, failure_reason, error, created_at, started_at, finished_at";

pub(super) fn task(row: &Row<'_>) -> Result<Task, StoreError> {
    let failure_reason: Option<String> = get(row, "failure_reason")?;
    Ok(Task {
        id: get::<String>(row, "id")?.into(),
        request_id: get::<String>(row, "request_id")?.into(),
        agent_type: parse("agent type", &get::<String>(row, "agent_type")?)?,
        step_index: get(row, "step_index")?,
        attempt: get(row, "attempt")?,
        input: from_json::<Value>("task input", &get::<String>(row, "input_json")?)?,
        output: from_opt_json("task output", get(row, "output_json")?)?,
        status: parse("task status", &get::<String>(row, "status")?)?,
        failure_reason: failure_reason
            .as_deref()
            .map(|r| parse("failure reason", r))
            .transpose()?,
        error: get(row, "error")?,
        created_at: parse_ts(&get::<String>(row, "created_at")?)?,
        started_at: parse_opt_ts(get(row, "started_at")?)?,
        finished_at: parse_opt_ts(get(row, "finished_at")?)?,
    })
}

pub(super) const ACTION_COLUMNS: &str = "a.id, a.request_id, a.action_type, a.target_service, \
     a.payload_json, a.confidence, a.status, a.approved_by, a.approved_at, a.executed_at, \
     a.result_json, a.created_at";

pub(super) fn action(row: &Row<'_>) -> Result<PendingAction, StoreError> {
    Ok(PendingAction {
        id: get::<String>(row, "id")?.into(),
        request_id: get::<String>(row, "request_id")?.into(),
        action_type: get(row, "action_type")?,
        target_service: get(row, "target_service")?,
        payload: from_json("action payload", &get::<String>(row, "payload_json")?)?,
        confidence: get(row, "confidence")?,
        status: parse("action status", &get::<String>(row, "status")?)?,
        approved_by: get(row, "approved_by")?,
        approved_at: parse_opt_ts(get(row, "approved_at")?)?,
        executed_at: parse_opt_ts(get(row, "executed_at")?)?,
        result: from_opt_json("action result", get(row, "result_json")?)?,
        created_at: parse_ts(&get::<String>(row, "created_at")?)?,
    })
}

pub(super) const EVENT_COLUMNS: &str = "seq, event_id, request_sequence, request_id, task_id, \
     event_type, actor, occurred_at, details_json, prev_hash, hash";

pub(super) fn event(row: &Row<'_>) -> Result<AuditEvent, StoreError> {
    let request_id: Option<String> = get(row, "request_id")?;
    let task_id: Option<String> = get(row, "task_id")?;
    let request_sequence: Option<i64> = get(row, "request_sequence")?;
    Ok(AuditEvent {
        id: EventId::new(get::<String>(row, "event_id")?),
        sequence: get(row, "seq")?,
        request_sequence: request_sequence.map(|s| s as u64),
        request_id: request_id.map(Into::into),
        task_id: task_id.map(Into::into),
        event_type: parse("event type", &get::<String>(row, "event_type")?)?,
        actor: Actor::parse(&get::<String>(row, "actor")?),
        timestamp: parse_ts(&get::<String>(row, "occurred_at")?)?,
        details: from_json("event details", &get::<String>(row, "details_json")?)?,
        prev_hash: get(row, "prev_hash")?,
        hash: get(row, "hash")?,
    })
}
