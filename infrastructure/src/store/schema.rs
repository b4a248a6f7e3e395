//! SQLite schema for the store and the audit ledger.

use rusqlite::{Connection, params};

pub(super) const SCHEMA_VERSION: i64 = 1;

pub(super) const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS documents (
  id TEXT PRIMARY KEY,
  filename TEXT NOT NULL,
  content_type TEXT NOT NULL,
  storage_key TEXT NOT NULL,
  owner TEXT NOT NULL,
  metadata_json TEXT NOT NULL,
  uploaded_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS passages (
  id TEXT PRIMARY KEY,
  doc_id TEXT NOT NULL,
  idx INTEGER NOT NULL,
  text TEXT NOT NULL,
  char_start INTEGER NOT NULL,
  char_end INTEGER NOT NULL,
  page INTEGER,
  metadata_json TEXT NOT NULL,
  UNIQUE(doc_id, idx),
  FOREIGN KEY (doc_id) REFERENCES documents(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS requests (
  id TEXT PRIMARY KEY,
  user_id TEXT NOT NULL,
  query TEXT NOT NULL,
  status TEXT NOT NULL CHECK (status IN ('pending','running','completed','failed')),
  phase TEXT NOT NULL,
  current_step INTEGER,
  step_phases_json TEXT NOT NULL DEFAULT '{}',
  output_json TEXT,
  failure_json TEXT,
  created_at TEXT NOT NULL,
  completed_at TEXT
);

CREATE TABLE IF NOT EXISTS tasks (
  id TEXT PRIMARY KEY,
  request_id TEXT NOT NULL,
  agent_type TEXT NOT NULL,
  step_index INTEGER,
  attempt INTEGER NOT NULL,
  input_json TEXT NOT NULL,
  output_json TEXT,
  status TEXT NOT NULL CHECK (status IN ('pending','running','succeeded','failed')),
  failure_reason TEXT,
  error TEXT,
  created_at TEXT NOT NULL,
  started_at TEXT,
  finished_at TEXT,
  FOREIGN KEY (request_id) REFERENCES requests(id)
);

CREATE TABLE IF NOT EXISTS pending_actions (
  id TEXT PRIMARY KEY,
  request_id TEXT NOT NULL,
  action_type TEXT NOT NULL,
  target_service TEXT NOT NULL,
  payload_json TEXT NOT NULL,
  confidence REAL NOT NULL,
  status TEXT NOT NULL CHECK (status IN ('pending','approved','rejected','executed','execution_failed')),
  approved_by TEXT,
  approved_at TEXT,
  executed_at TEXT,
  result_json TEXT,
  created_at TEXT NOT NULL,
  FOREIGN KEY (request_id) REFERENCES requests(id)
);

CREATE TABLE IF NOT EXISTS audit_events (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  event_id TEXT NOT NULL UNIQUE,
  request_sequence INTEGER,
  request_id TEXT,
  task_id TEXT,
  event_type TEXT NOT NULL,
  actor TEXT NOT NULL,
  occurred_at TEXT NOT NULL,
  details_json TEXT NOT NULL,
  prev_hash TEXT NOT NULL,
  hash TEXT NOT NULL,
  UNIQUE(request_id, request_sequence)
);

CREATE INDEX IF NOT EXISTS idx_passages_doc ON passages(doc_id, idx);
CREATE INDEX IF NOT EXISTS idx_requests_status ON requests(status);
CREATE INDEX IF NOT EXISTS idx_tasks_request ON tasks(request_id);
CREATE INDEX IF NOT EXISTS idx_actions_status ON pending_actions(status);
CREATE INDEX IF NOT EXISTS idx_actions_request ON pending_actions(request_id);
CREATE INDEX IF NOT EXISTS idx_audit_request_seq ON audit_events(request_id, seq);
CREATE INDEX IF NOT EXISTS idx_audit_task_seq ON audit_events(task_id, seq);
CREATE INDEX IF NOT EXISTS idx_audit_type_seq ON audit_events(event_type, seq);

CREATE TRIGGER IF NOT EXISTS trg_audit_events_no_update
BEFORE UPDATE ON audit_events
BEGIN
  SELECT RAISE(FAIL, 'audit_events is append-only');
END;
CREATE TRIGGER IF NOT EXISTS trg_audit_events_no_delete
BEFORE DELETE ON audit_events
BEGIN
  SELECT RAISE(FAIL, 'audit_events is append-only');
END;
";

pub(super) fn migrate(conn: &Connection, now: &str) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![SCHEMA_VERSION, now],
    )?;
    Ok(())
}
