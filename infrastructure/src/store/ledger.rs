//! Hash-chained audit ledger on top of `audit_events`.

use super::SqliteStore;
use super::rows::{self, DbResultExt, EVENT_COLUMNS};
use async_trait::async_trait;
use attest_application::{AuditLedger, StoreError};
use attest_domain::audit::{GENESIS_HASH, format_timestamp};
use attest_domain::{AuditEvent, AuditFilter, ChainVerification, ChainVerifier, NewAuditEvent};
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use std::sync::{Arc, Mutex, PoisonError};

/// Rows fetched per round trip while streaming a query.
const PAGE_SIZE: usize = 256;

/// Seal `event` after the current chain head and insert it.
///
/// Callers hold the write transaction, so reading the head and inserting
/// the successor cannot interleave with another writer.
pub(super) fn append_event(
    conn: &Connection,
    event: NewAuditEvent,
) -> Result<AuditEvent, StoreError> {
    let prev: Option<String> = conn
        .query_row(
            "SELECT hash FROM audit_events ORDER BY seq DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()
        .db()?;
    let request_sequence = match &event.request_id {
        Some(request_id) => {
            let next: i64 = conn
                .query_row(
                    "SELECT COALESCE(MAX(request_sequence), 0) + 1 FROM audit_events \
                     WHERE request_id = ?1",
                    params![request_id.as_str()],
                    |row| row.get(0),
                )
                .db()?;
            Some(next as u64)
        }
        None => None,
    };

    let mut sealed = event.seal(
        request_sequence,
        prev.as_deref().unwrap_or(GENESIS_HASH),
        Utc::now(),
    );
    conn.execute(
        "INSERT INTO audit_events(event_id, request_sequence, request_id, task_id, event_type, \
         actor, occurred_at, details_json, prev_hash, hash) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            sealed.id.as_str(),
            sealed.request_sequence.map(|s| s as i64),
            sealed.request_id.as_ref().map(|r| r.as_str()),
            sealed.task_id.as_ref().map(|t| t.as_str()),
            sealed.event_type.as_str(),
            sealed.actor.to_string(),
            format_timestamp(&sealed.timestamp),
            rows::to_json(&sealed.details)?,
            sealed.prev_hash,
            sealed.hash,
        ],
    )
    .db()?;
    sealed.sequence = conn.last_insert_rowid();
    Ok(sealed)
}

fn fetch_page(
    conn: &Connection,
    filter: &AuditFilter,
    after: i64,
) -> Result<Vec<AuditEvent>, StoreError> {
    let sql = format!(
        "SELECT {EVENT_COLUMNS} FROM audit_events \
         WHERE seq > ?1 \
           AND (?2 IS NULL OR request_id = ?2) \
           AND (?3 IS NULL OR task_id = ?3) \
           AND (?4 IS NULL OR event_type = ?4) \
           AND (?5 IS NULL OR actor = ?5) \
           AND (?6 IS NULL OR occurred_at >= ?6) \
           AND (?7 IS NULL OR occurred_at < ?7) \
         ORDER BY seq LIMIT ?8"
    );
    let mut stmt = conn.prepare_cached(&sql).db()?;
    let mut result = stmt
        .query(params![
            after,
            filter.request_id.as_ref().map(|r| r.as_str()),
            filter.task_id.as_ref().map(|t| t.as_str()),
            filter.event_type.map(|e| e.as_str()),
            filter.actor.as_ref().map(|a| a.to_string()),
            filter.since.as_ref().map(format_timestamp),
            filter.until.as_ref().map(format_timestamp),
            PAGE_SIZE as i64,
        ])
        .db()?;

    let mut events = Vec::new();
    while let Some(row) = result.next().db()? {
        events.push(rows::event(row)?);
    }
    Ok(events)
}

async fn next_page(
    conn: Arc<Mutex<Connection>>,
    filter: AuditFilter,
    after: i64,
) -> Result<Vec<AuditEvent>, StoreError> {
    tokio::task::spawn_blocking(move || {
        let guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
        fetch_page(&guard, &filter, after)
    })
    .await
    .map_err(|e| StoreError::Database(format!("store worker failed: {}", e)))?
}

#[async_trait]
impl AuditLedger for SqliteStore {
    async fn append(&self, event: NewAuditEvent) -> Result<AuditEvent, StoreError> {
        self.run(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .db()?;
            let sealed = append_event(&tx, event)?;
            tx.commit().db()?;
            Ok(sealed)
        })
        .await
    }

    fn query(&self, filter: AuditFilter) -> BoxStream<'_, Result<AuditEvent, StoreError>> {
        let conn = self.conn.clone();
        stream::unfold(Some(0i64), move |cursor| {
            let conn = conn.clone();
            let filter = filter.clone();
            async move {
                let after = cursor?;
                let (page, next): (Vec<Result<AuditEvent, StoreError>>, _) =
                    match next_page(conn, filter, after).await {
                        Ok(events) if events.is_empty() => return None,
                        Ok(events) => {
                            let next = match events.last() {
                                Some(last) if events.len() == PAGE_SIZE => Some(last.sequence),
                                _ => None,
                            };
                            (events.into_iter().map(Ok).collect(), next)
                        }
                        Err(e) => (vec![Err(e)], None),
                    };
                Some((stream::iter(page), next))
            }
        })
        .flatten()
        .boxed()
    }

    async fn verify_chain(&self) -> Result<ChainVerification, StoreError> {
        let mut verifier = ChainVerifier::new();
        let mut events = self.query(AuditFilter::default());
        while let Some(event) = events.try_next().await? {
            if let Err(broken) = verifier.push(&event) {
                return Ok(verifier.finish(Some(broken)));
            }
        }
        Ok(verifier.finish(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_domain::{Actor, EventType, RequestId};
    use serde_json::json;

    fn standalone(i: usize) -> NewAuditEvent {
        NewAuditEvent::new(
            EventType::RequestPhaseChanged,
            Actor::System,
            json!({"version": 1, "i": i}),
        )
    }

    #[tokio::test]
    async fn test_append_chains_hashes() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = store.append(standalone(0)).await.unwrap();
        let second = store
            .append(standalone(1).for_request(RequestId::new("r1")))
            .await
            .unwrap();
        let third = store
            .append(standalone(2).for_request(RequestId::new("r1")))
            .await
            .unwrap();

        assert_eq!(first.prev_hash, GENESIS_HASH);
        assert_eq!(second.prev_hash, first.hash);
        assert_eq!(first.request_sequence, None);
        assert_eq!(second.request_sequence, Some(1));
        assert_eq!(third.request_sequence, Some(2));
        assert!(third.sequence > second.sequence);

        let verification = store.verify_chain().await.unwrap();
        assert!(verification.is_intact());
        assert_eq!(verification.checked, 3);
    }

    #[tokio::test]
    async fn test_query_streams_across_pages_in_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        for i in 0..(PAGE_SIZE + 10) {
            store.append(standalone(i)).await.unwrap();
        }
        let events: Vec<AuditEvent> = store
            .query(AuditFilter::default())
            .try_collect()
            .await
            .unwrap();
        assert_eq!(events.len(), PAGE_SIZE + 10);
        assert!(events.windows(2).all(|w| w[0].sequence < w[1].sequence));
        assert_eq!(events[0].details["i"], 0);
    }

    #[tokio::test]
    async fn test_query_filters_by_actor_and_type() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.append(standalone(0)).await.unwrap();
        store
            .append(NewAuditEvent::new(
                EventType::DocumentDeleted,
                Actor::user("alice"),
                json!({"version": 1}),
            ))
            .await
            .unwrap();

        let by_actor: Vec<AuditEvent> = store
            .query(AuditFilter::default().with_actor(Actor::user("alice")))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(by_actor.len(), 1);
        assert_eq!(by_actor[0].event_type, EventType::DocumentDeleted);

        let by_type: Vec<AuditEvent> = store
            .query(AuditFilter::default().with_event_type(EventType::RequestPhaseChanged))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(by_type.len(), 1);
    }

    #[tokio::test]
    async fn test_time_window_is_half_open() {
        let store = SqliteStore::open_in_memory().unwrap();
        let event = store.append(standalone(0)).await.unwrap();

        let from: Vec<AuditEvent> = store
            .query(AuditFilter::default().between(Some(event.timestamp), None))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(from.len(), 1);

        let before: Vec<AuditEvent> = store
            .query(AuditFilter::default().between(None, Some(event.timestamp)))
            .try_collect()
            .await
            .unwrap();
        assert!(before.is_empty());
    }

    #[tokio::test]
    async fn test_audit_events_are_append_only() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.append(standalone(0)).await.unwrap();

        let conn = store.conn.lock().unwrap();
        let update = conn.execute("UPDATE audit_events SET actor = 'user:mallory'", []);
        assert!(update.is_err());
        let delete = conn.execute("DELETE FROM audit_events", []);
        assert!(delete.is_err());
    }

    #[tokio::test]
    async fn test_verify_reports_rewritten_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        for i in 0..3 {
            store.append(standalone(i)).await.unwrap();
        }
        {
            // Bypass the triggers the way an attacker with file access would
            let conn = store.conn.lock().unwrap();
            conn.execute_batch(
                "DROP TRIGGER trg_audit_events_no_update;
                 UPDATE audit_events SET details_json = '{\"i\":99}' WHERE seq = 2;",
            )
            .unwrap();
        }
        let verification = store.verify_chain().await.unwrap();
        assert_eq!(verification.checked, 1);
        assert_eq!(verification.broken.map(|b| b.sequence), Some(2));
    }
}
