//! Action domain module
//!
//! Proposed side-effecting operations and the one-directional approval
//! lifecycle that guards them.

pub mod entities;

pub use entities::{ActionStatus, ActionTransition, PendingAction, ProposedAction};
