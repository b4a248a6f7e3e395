//! `PersistentStore` over the entity tables.

use super::SqliteStore;
use super::ledger::append_event;
use super::rows::{
    self, ACTION_COLUMNS, DOCUMENT_COLUMNS, DbResultExt, PASSAGE_COLUMNS, REQUEST_COLUMNS,
    TASK_COLUMNS, opt_json, opt_ts, to_json, ts,
};
use async_trait::async_trait;
use attest_application::{ActionQuery, PersistentStore, StoreError};
use attest_domain::audit::DETAILS_VERSION;
use attest_domain::{
    ActionId, ActionStatus, ActionTransition, Actor, Document, DocumentId, EventType,
    NewAuditEvent, Passage, PassageId, PendingAction, Request, RequestId, RequestTransition, Task,
    TaskId, TaskTransition,
};
use chrono::Utc;
use rusqlite::{Connection, Params, Row, TransactionBehavior, params};
use serde_json::{Value, json};

type RowMapper<T> = fn(&Row<'_>) -> Result<T, StoreError>;

fn select_all<T>(
    conn: &Connection,
    sql: &str,
    params: impl Params,
    map: RowMapper<T>,
) -> Result<Vec<T>, StoreError> {
    let mut stmt = conn.prepare_cached(sql).db()?;
    let mut result = stmt.query(params).db()?;
    let mut out = Vec::new();
    while let Some(row) = result.next().db()? {
        out.push(map(row)?);
    }
    Ok(out)
}

fn select_one<T>(
    conn: &Connection,
    sql: &str,
    params: impl Params,
    map: RowMapper<T>,
) -> Result<Option<T>, StoreError> {
    Ok(select_all(conn, sql, params, map)?.into_iter().next())
}

fn load_document(conn: &Connection, id: &str) -> Result<Option<Document>, StoreError> {
    select_one(
        conn,
        &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
        params![id],
        rows::document,
    )
}

fn load_request(conn: &Connection, id: &str) -> Result<Option<Request>, StoreError> {
    select_one(
        conn,
        &format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = ?1"),
        params![id],
        rows::request,
    )
}

fn load_task(conn: &Connection, id: &str) -> Result<Option<Task>, StoreError> {
    select_one(
        conn,
        &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
        params![id],
        rows::task,
    )
}

fn load_action(conn: &Connection, id: &str) -> Result<Option<PendingAction>, StoreError> {
    select_one(
        conn,
        &format!("SELECT {ACTION_COLUMNS} FROM pending_actions a WHERE a.id = ?1"),
        params![id],
        rows::action,
    )
}

fn insert_passage(conn: &Connection, passage: &Passage) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO passages(id, doc_id, idx, text, char_start, char_end, page, metadata_json) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            passage.id.as_str(),
            passage.doc_id.as_str(),
            passage.index,
            passage.text,
            passage.char_start as i64,
            passage.char_end as i64,
            passage.page,
            to_json(&passage.metadata)?,
        ],
    )
    .db()?;
    Ok(())
}

fn write_request(conn: &Connection, request: &Request, insert: bool) -> Result<(), StoreError> {
    let sql = if insert {
        "INSERT INTO requests(id, user_id, query, status, phase, current_step, output_json, \
         failure_json, created_at, completed_at, step_phases_json) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
    } else {
        "UPDATE requests SET user_id = ?2, query = ?3, status = ?4, phase = ?5, \
         current_step = ?6, output_json = ?7, failure_json = ?8, created_at = ?9, \
         completed_at = ?10, step_phases_json = ?11 WHERE id = ?1"
    };
    conn.execute(
        sql,
        params![
            request.id.as_str(),
            request.user_id,
            request.query,
            request.status.as_str(),
            request.phase.as_str(),
            request.current_step,
            opt_json(&request.output)?,
            opt_json(&request.failure)?,
            ts(&request.created_at),
            opt_ts(&request.completed_at),
            to_json(&request.step_phases)?,
        ],
    )
    .db()?;
    Ok(())
}

fn write_task(conn: &Connection, task: &Task, insert: bool) -> Result<(), StoreError> {
    let sql = if insert {
        "INSERT INTO tasks(id, request_id, agent_type, step_index, attempt, input_json, \
         output_json, status, failure_reason, error, created_at, started_at, finished_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
    } else {
        "UPDATE tasks SET request_id = ?2, agent_type = ?3, step_index = ?4, attempt = ?5, \
         input_json = ?6, output_json = ?7, status = ?8, failure_reason = ?9, error = ?10, \
         created_at = ?11, started_at = ?12, finished_at = ?13 WHERE id = ?1"
    };
    conn.execute(
        sql,
        params![
            task.id.as_str(),
            task.request_id.as_str(),
            task.agent_type.as_str(),
            task.step_index,
            task.attempt,
            to_json(&task.input)?,
            opt_json(&task.output)?,
            task.status.as_str(),
            task.failure_reason.map(|r| r.as_str()),
            task.error,
            ts(&task.created_at),
            opt_ts(&task.started_at),
            opt_ts(&task.finished_at),
        ],
    )
    .db()?;
    Ok(())
}

fn insert_action(conn: &Connection, action: &PendingAction) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO pending_actions(id, request_id, action_type, target_service, payload_json, \
         confidence, status, approved_by, approved_at, executed_at, result_json, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            action.id.as_str(),
            action.request_id.as_str(),
            action.action_type,
            action.target_service,
            to_json(&action.payload)?,
            action.confidence,
            action.status.as_str(),
            action.approved_by,
            opt_ts(&action.approved_at),
            opt_ts(&action.executed_at),
            opt_json(&action.result)?,
            ts(&action.created_at),
        ],
    )
    .db()?;
    Ok(())
}

/// Update an action only if it still has `expected` status.
fn swap_action(
    conn: &Connection,
    action: &PendingAction,
    expected: ActionStatus,
) -> Result<usize, StoreError> {
    conn.execute(
        "UPDATE pending_actions SET status = ?2, approved_by = ?3, approved_at = ?4, \
         executed_at = ?5, result_json = ?6 WHERE id = ?1 AND status = ?7",
        params![
            action.id.as_str(),
            action.status.as_str(),
            action.approved_by,
            opt_ts(&action.approved_at),
            opt_ts(&action.executed_at),
            opt_json(&action.result)?,
            expected.as_str(),
        ],
    )
    .db()
}

fn conflict(id: &ActionId, expected: ActionStatus, actual: ActionStatus) -> StoreError {
    StoreError::Conflict {
        entity: "pending_action",
        id: id.to_string(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

#[async_trait]
impl PersistentStore for SqliteStore {
    // ==================== Documents ====================

    async fn insert_document(
        &self,
        document: &Document,
        passages: &[Passage],
        actor: Actor,
    ) -> Result<(), StoreError> {
        let document = document.clone();
        let passages = passages.to_vec();
        self.run(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .db()?;
            tx.execute(
                "INSERT INTO documents(id, filename, content_type, storage_key, owner, \
                 metadata_json, uploaded_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    document.id.as_str(),
                    document.filename,
                    document.content_type,
                    document.storage_key,
                    document.owner,
                    to_json(&document.metadata)?,
                    ts(&document.uploaded_at),
                ],
            )
            .db()?;
            for passage in &passages {
                insert_passage(&tx, passage)?;
            }
            let event = NewAuditEvent::transition::<Document>(
                EventType::DocumentIngested,
                actor,
                "document",
                document.id.as_str(),
                None,
                &document,
            )?
            .with_detail("passages", Value::from(passages.len()));
            append_event(&tx, event)?;
            tx.commit().db()
        })
        .await
    }

    async fn get_document(&self, id: &DocumentId) -> Result<Option<Document>, StoreError> {
        let id = id.clone();
        self.run(move |conn| load_document(conn, id.as_str())).await
    }

    async fn list_passages(&self, doc_id: &DocumentId) -> Result<Vec<Passage>, StoreError> {
        let doc_id = doc_id.clone();
        self.run(move |conn| {
            select_all(
                conn,
                &format!("SELECT {PASSAGE_COLUMNS} FROM passages WHERE doc_id = ?1 ORDER BY idx"),
                params![doc_id.as_str()],
                rows::passage,
            )
        })
        .await
    }

    async fn get_passages(&self, ids: &[PassageId]) -> Result<Vec<Passage>, StoreError> {
        let ids = ids.to_vec();
        self.run(move |conn| {
            let sql = format!("SELECT {PASSAGE_COLUMNS} FROM passages WHERE id = ?1");
            let mut found = Vec::with_capacity(ids.len());
            for id in &ids {
                if let Some(passage) = select_one(conn, &sql, params![id.as_str()], rows::passage)?
                {
                    found.push(passage);
                }
            }
            Ok(found)
        })
        .await
    }

    async fn delete_document(&self, id: &DocumentId, actor: Actor) -> Result<Document, StoreError> {
        let id = id.clone();
        self.run(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .db()?;
            let document = load_document(&tx, id.as_str())?
                .ok_or_else(|| StoreError::not_found("document", &id))?;
            let removed = tx
                .execute("DELETE FROM passages WHERE doc_id = ?1", params![id.as_str()])
                .db()?;
            tx.execute("DELETE FROM documents WHERE id = ?1", params![id.as_str()])
                .db()?;
            let event = NewAuditEvent::new(
                EventType::DocumentDeleted,
                actor,
                json!({
                    "version": DETAILS_VERSION,
                    "entity": "document",
                    "entity_id": id.as_str(),
                    "before": serde_json::to_value(&document)
                        .map_err(|e| rows::corrupt("document", e))?,
                    "after": Value::Null,
                    "passages": removed,
                }),
            );
            append_event(&tx, event)?;
            tx.commit().db()?;
            Ok(document)
        })
        .await
    }

    // ==================== Requests ====================

    async fn insert_request(&self, request: &Request, actor: Actor) -> Result<(), StoreError> {
        let request = request.clone();
        self.run(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .db()?;
            write_request(&tx, &request, true)?;
            let event = NewAuditEvent::transition::<Request>(
                EventType::RequestCreated,
                actor,
                "request",
                request.id.as_str(),
                None,
                &request,
            )?
            .for_request(request.id.clone());
            append_event(&tx, event)?;
            tx.commit().db()
        })
        .await
    }

    async fn transition_request(
        &self,
        id: &RequestId,
        transition: RequestTransition,
        actor: Actor,
    ) -> Result<Request, StoreError> {
        let id = id.clone();
        self.run(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .db()?;
            let current = load_request(&tx, id.as_str())?
                .ok_or_else(|| StoreError::not_found("request", &id))?;
            let next = current.apply(&transition, Utc::now())?;
            write_request(&tx, &next, false)?;
            let event = NewAuditEvent::transition(
                transition.event_type(),
                actor,
                "request",
                id.as_str(),
                Some(&current),
                &next,
            )?
            .for_request(id.clone());
            append_event(&tx, event)?;
            tx.commit().db()?;
            Ok(next)
        })
        .await
    }

    async fn get_request(&self, id: &RequestId) -> Result<Option<Request>, StoreError> {
        let id = id.clone();
        self.run(move |conn| load_request(conn, id.as_str())).await
    }

    async fn list_active_requests(&self) -> Result<Vec<Request>, StoreError> {
        self.run(|conn| {
            select_all(
                conn,
                &format!(
                    "SELECT {REQUEST_COLUMNS} FROM requests \
                     WHERE status IN ('pending', 'running') ORDER BY created_at, rowid"
                ),
                [],
                rows::request,
            )
        })
        .await
    }

    // ==================== Tasks ====================

    async fn insert_task(&self, task: &Task, actor: Actor) -> Result<(), StoreError> {
        let task = task.clone();
        self.run(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .db()?;
            write_task(&tx, &task, true)?;
            let event = NewAuditEvent::transition::<Task>(
                EventType::TaskCreated,
                actor,
                "task",
                task.id.as_str(),
                None,
                &task,
            )?
            .for_request(task.request_id.clone())
            .for_task(task.id.clone());
            append_event(&tx, event)?;
            tx.commit().db()
        })
        .await
    }

    async fn transition_task(
        &self,
        id: &TaskId,
        transition: TaskTransition,
        actor: Actor,
    ) -> Result<Task, StoreError> {
        let id = id.clone();
        self.run(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .db()?;
            let current =
                load_task(&tx, id.as_str())?.ok_or_else(|| StoreError::not_found("task", &id))?;
            let next = current.apply(&transition, Utc::now())?;
            write_task(&tx, &next, false)?;
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
            append_event(&tx, event)?;
            tx.commit().db()?;
            Ok(next)
        })
        .await
    }

    async fn list_tasks(&self, request_id: &RequestId) -> Result<Vec<Task>, StoreError> {
        let request_id = request_id.clone();
        self.run(move |conn| {
            select_all(
                conn,
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE request_id = ?1 ORDER BY rowid"),
                params![request_id.as_str()],
                rows::task,
            )
        })
        .await
    }

    // ==================== Pending actions ====================

    async fn insert_actions(
        &self,
        actions: &[PendingAction],
        actor: Actor,
    ) -> Result<(), StoreError> {
        let actions = actions.to_vec();
        self.run(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .db()?;
            for action in &actions {
                insert_action(&tx, action)?;
                let event = NewAuditEvent::transition::<PendingAction>(
                    EventType::ActionProposed,
                    actor.clone(),
                    "pending_action",
                    action.id.as_str(),
                    None,
                    action,
                )?
                .for_request(action.request_id.clone());
                append_event(&tx, event)?;
            }
            tx.commit().db()
        })
        .await
    }

    async fn transition_action(
        &self,
        id: &ActionId,
        expected: ActionStatus,
        transition: ActionTransition,
        actor: Actor,
        extra: Option<Value>,
    ) -> Result<PendingAction, StoreError> {
        let id = id.clone();
        self.run(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .db()?;
            let current = load_action(&tx, id.as_str())?
                .ok_or_else(|| StoreError::not_found("pending_action", &id))?;
            if current.status != expected {
                return Err(conflict(&id, expected, current.status));
            }
            let next = current.apply(&transition, Utc::now())?;
            if swap_action(&tx, &next, expected)? == 0 {
                return Err(conflict(&id, expected, current.status));
            }

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
            append_event(&tx, event)?;
            tx.commit().db()?;
            Ok(next)
        })
        .await
    }

    async fn get_action(&self, id: &ActionId) -> Result<Option<PendingAction>, StoreError> {
        let id = id.clone();
        self.run(move |conn| load_action(conn, id.as_str())).await
    }

    async fn list_actions(&self, query: &ActionQuery) -> Result<Vec<PendingAction>, StoreError> {
        let query = query.clone();
        self.run(move |conn| {
            select_all(
                conn,
                &format!(
                    "SELECT {ACTION_COLUMNS} FROM pending_actions a \
                     JOIN requests r ON r.id = a.request_id \
                     WHERE (?1 IS NULL OR a.status = ?1) \
                       AND (?2 IS NULL OR r.user_id = ?2) \
                       AND (?3 IS NULL OR a.request_id = ?3) \
                     ORDER BY a.rowid"
                ),
                params![
                    query.status.map(|s| s.as_str()),
                    query.request_owner,
                    query.request_id.as_ref().map(|r| r.as_str()),
                ],
                rows::action,
            )
        })
        .await
    }
}
