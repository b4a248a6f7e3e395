//! Document domain module
//!
//! Ingested documents and the passages they are chunked into. Passages are
//! the unit of retrieval and citation: they are created once at ingestion,
//! never mutated, and ordered by `(doc_id, index)`.

pub mod entities;

pub use entities::{Document, Passage, PassageCandidate};
