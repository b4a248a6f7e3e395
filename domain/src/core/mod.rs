//! Core domain concepts shared across all subdomains.
//!
//! - [`ids`] - typed identifiers for every persisted entity
//! - [`actor`] - who caused a state transition
//! - [`error::DomainError`] - domain-level errors

pub mod actor;
pub mod error;
pub mod ids;
pub mod string;

pub use actor::Actor;
pub use error::DomainError;
pub use ids::{ActionId, DocumentId, EventId, PassageId, RequestId, TaskId};
