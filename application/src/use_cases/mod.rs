//! Use cases
//!
//! Application-level operations that orchestrate domain logic.

pub mod approval;
pub mod audit;
pub mod documents;
pub mod ingest_document;
pub mod orchestrator;
