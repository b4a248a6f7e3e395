//! Port definitions (interfaces for external adapters)
//!
//! Ports define the contracts that infrastructure adapters must implement.

pub mod agent;
pub mod approvers;
pub mod collaborators;
pub mod ledger;
pub mod progress;
pub mod store;
