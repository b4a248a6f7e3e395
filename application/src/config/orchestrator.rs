//! Orchestrator parameters.

use crate::config::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// What to do when a summary still fails citation validation after the
/// corrective attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationPolicy {
    /// Complete the request with the summary flagged as unverified
    #[default]
    Degrade,
    /// Fail the request with `citation_mismatch`
    Fail,
}

impl CitationPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CitationPolicy::Degrade => "degrade",
            CitationPolicy::Fail => "fail",
        }
    }
}

impl fmt::Display for CitationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CitationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "degrade" => Ok(CitationPolicy::Degrade),
            "fail" => Ok(CitationPolicy::Fail),
            other => Err(format!("unknown citation policy: {}", other)),
        }
    }
}

/// Request orchestration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Bound on every agent call
    pub agent_timeout: Duration,
    /// Passages handed to the summarizer after fusion
    pub top_n: usize,
    pub citation_policy: CitationPolicy,
    /// Run steps the planner marks independent concurrently
    pub parallel_independent_steps: bool,
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            agent_timeout: Duration::from_secs(60),
            top_n: 5,
            citation_policy: CitationPolicy::Degrade,
            parallel_independent_steps: false,
            retry: RetryPolicy::default(),
        }
    }
}

impl OrchestratorConfig {
    // ==================== Builder Methods ====================

    pub fn with_agent_timeout(mut self, timeout: Duration) -> Self {
        self.agent_timeout = timeout;
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn with_citation_policy(mut self, policy: CitationPolicy) -> Self {
        self.citation_policy = policy;
        self
    }

    pub fn with_parallel_independent_steps(mut self, enabled: bool) -> Self {
        self.parallel_independent_steps = enabled;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.agent_timeout, Duration::from_secs(60));
        assert_eq!(config.top_n, 5);
        assert_eq!(config.citation_policy, CitationPolicy::Degrade);
        assert!(!config.parallel_independent_steps);
    }

    #[test]
    fn test_builder() {
        let config = OrchestratorConfig::default()
            .with_top_n(8)
            .with_citation_policy(CitationPolicy::Fail)
            .with_retry(RetryPolicy::none());
        assert_eq!(config.top_n, 8);
        assert_eq!(config.citation_policy, CitationPolicy::Fail);
        assert_eq!(config.retry.max_attempts, 1);
    }

    #[test]
    fn test_citation_policy_parse() {
        assert_eq!("Fail".parse::<CitationPolicy>(), Ok(CitationPolicy::Fail));
        assert!("ignore".parse::<CitationPolicy>().is_err());
    }
}
