//! Task fabric sizing.

use serde::{Deserialize, Serialize};

/// Worker pool and queue sizing for the task fabric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FabricConfig {
    /// Concurrent workers per agent type
    pub workers_per_agent: usize,
    /// Bounded queue length per agent type
    pub queue_capacity: usize,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            workers_per_agent: 4,
            queue_capacity: 64,
        }
    }
}

impl FabricConfig {
    pub fn with_workers_per_agent(mut self, workers: usize) -> Self {
        self.workers_per_agent = workers;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }
}
