//! Application-level configuration.
//!
//! This module provides configuration types that control how use cases behave:
//!
//! - [`OrchestratorConfig`] - agent timeout, fusion top-N, citation policy
//! - [`RetryPolicy`] - bounded exponential backoff for transient failures
//! - [`FabricConfig`] - worker pool and queue sizing

pub mod fabric;
pub mod orchestrator;
pub mod retry;

pub use fabric::FabricConfig;
pub use orchestrator::{CitationPolicy, OrchestratorConfig};
pub use retry::RetryPolicy;
