//! Audit domain module
//!
//! Immutable audit events, the SHA-256 hash chain that makes tampering
//! detectable, and replay helpers that rebuild entity histories from the
//! ledger.

pub mod entities;
pub mod replay;

pub use entities::{
    AuditEvent, AuditFilter, BrokenLink, ChainVerification, ChainVerifier, DETAILS_VERSION,
    EventType, GENESIS_HASH, NewAuditEvent, format_timestamp,
};
pub use replay::{
    HistoryEntry, action_status_history, is_legal_action_history, request_phase_history,
};
