//! Domain layer for attest
//!
//! This crate contains the entities, value objects and pure rules of the
//! orchestration and provenance engine. It has no dependencies on
//! infrastructure or presentation concerns.
//!
//! # Core Concepts
//!
//! ## Request
//!
//! One user query, persisted as an explicit finite-state machine:
//! `created → planning → {retrieving → summarizing → deciding → acting}* →
//! finalizing → completed`, with `failed` reachable from any non-terminal
//! phase.
//!
//! ## Provenance
//!
//! - **Citation validation**: every citation a summarizer emits must resolve
//!   to a passage it was actually given
//! - **Approval**: side-effecting actions wait in `pending` until a human
//!   approves or rejects them
//! - **Audit**: every state transition is an immutable, hash-chained event

pub mod action;
pub mod audit;
pub mod citation;
pub mod config;
pub mod core;
pub mod document;
pub mod pipeline;
pub mod request;
pub mod retrieval;
pub mod task;

// Re-export commonly used types
pub use action::{ActionStatus, ActionTransition, PendingAction, ProposedAction};
pub use audit::{
    AuditEvent, AuditFilter, BrokenLink, ChainVerification, ChainVerifier, EventType,
    HistoryEntry, NewAuditEvent,
};
pub use citation::{Citation, CitationToken, ValidationOutcome};
pub use config::OutputFormat;
pub use core::{
    actor::Actor,
    error::DomainError,
    ids::{ActionId, DocumentId, EventId, PassageId, RequestId, TaskId},
};
pub use document::{Document, Passage, PassageCandidate};
pub use pipeline::{
    ActionInput, ActionOutput, AgentInput, AgentOutput, DecisionInput, DecisionOutput, PlanStep,
    PlannerInput, PlannerOutput, RetrieverInput, RetrieverOutput, Step, StepResult,
    SummarizerInput, SummarizerOutput,
};
pub use request::{
    Request, RequestFailure, RequestOutput, RequestPhase, RequestStatus, RequestTransition,
};
pub use retrieval::{RankedCandidate, RankedPassage, reciprocal_rank_fusion};
pub use task::{AgentType, FailureReason, Task, TaskStatus, TaskTransition};
