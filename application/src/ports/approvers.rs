//! Approver directory port
//!
//! Decides who may resolve pending actions. Consulted before the approval
//! gate reads any state.

use std::collections::BTreeSet;

/// Authorization scope for approvals.
pub trait ApproverDirectory: Send + Sync {
    /// Whether this user may approve or reject any pending action
    fn is_approver(&self, user_id: &str) -> bool;
}

/// Fixed set of approvers, typically from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticApprovers {
    approvers: BTreeSet<String>,
}

impl StaticApprovers {
    pub fn new<I, S>(approvers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            approvers: approvers.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.approvers.is_empty()
    }
}

impl ApproverDirectory for StaticApprovers {
    fn is_approver(&self, user_id: &str) -> bool {
        self.approvers.contains(user_id)
    }
}
