//! Task fabric
//!
//! Decouples callers from agents with message passing. Each registered agent
//! type gets a bounded queue drained by a pool of workers. A caller enqueues
//! a [`TaskEnvelope`] and suspends on a `oneshot` reply correlated to that
//! envelope, until the reply arrives, the per-call timeout elapses, or the
//! caller's cancellation token fires.
//!
//! Cancellation is a message: the envelope carries a child token, and the
//! worker abandons the agent future when it is cancelled.

use crate::config::FabricConfig;
use crate::ports::agent::{Agent, AgentError, AgentRegistry};
use attest_domain::{AgentInput, AgentOutput, AgentType, FailureReason, TaskId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Errors surfaced to a fabric caller
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FabricError {
    #[error("Agent call timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("Cancelled")]
    Cancelled,

    #[error("No agent registered for {0}")]
    NoAgent(AgentType),

    #[error("Fabric is shut down")]
    Closed,
}

impl FabricError {
    pub fn reason(&self) -> FailureReason {
        match self {
            FabricError::Timeout(_) => FailureReason::Timeout,
            FabricError::Agent(e) => e.reason(),
            FabricError::Cancelled => FailureReason::Cancelled,
            FabricError::NoAgent(_) | FabricError::Closed => FailureReason::Internal,
        }
    }
}

/// One unit of work on an agent queue.
pub struct TaskEnvelope {
    pub task_id: TaskId,
    pub input: AgentInput,
    pub timeout: Duration,
    pub cancel: CancellationToken,
    reply: oneshot::Sender<Result<AgentOutput, FabricError>>,
}

/// Agent queues and their worker pools.
pub struct TaskFabric {
    queues: HashMap<AgentType, mpsc::Sender<TaskEnvelope>>,
    shutdown: CancellationToken,
    workers: std::sync::Mutex<JoinSet<()>>,
}

impl TaskFabric {
    /// Spawn workers for every agent in the registry.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(registry: &AgentRegistry, config: &FabricConfig) -> Self {
        let shutdown = CancellationToken::new();
        let mut workers = JoinSet::new();
        let mut queues = HashMap::new();

        for (agent_type, agent) in registry.iter() {
            let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
            let rx = Arc::new(Mutex::new(rx));
            for worker in 0..config.workers_per_agent.max(1) {
                workers.spawn(run_worker(
                    *agent_type,
                    worker,
                    Arc::clone(agent),
                    Arc::clone(&rx),
                    shutdown.clone(),
                ));
            }
            queues.insert(*agent_type, tx);
        }

        debug!(
            agents = queues.len(),
            workers_per_agent = config.workers_per_agent,
            "Task fabric started"
        );

        Self {
            queues,
            shutdown,
            workers: std::sync::Mutex::new(workers),
        }
    }

    /// Enqueue a task and wait for its correlated reply.
    ///
    /// `timeout` bounds the whole exchange: time spent waiting for queue
    /// space or behind busy workers counts against it.
    pub async fn dispatch(
        &self,
        task_id: &TaskId,
        input: AgentInput,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<AgentOutput, FabricError> {
        let agent_type = input.agent_type();
        let queue = self
            .queues
            .get(&agent_type)
            .ok_or(FabricError::NoAgent(agent_type))?;

        let (reply, response) = oneshot::channel();
        let task_cancel = cancel.child_token();
        let envelope = TaskEnvelope {
            task_id: task_id.clone(),
            input,
            timeout,
            cancel: task_cancel.clone(),
            reply,
        };

        let exchange = async {
            queue
                .send(envelope)
                .await
                .map_err(|_| FabricError::Closed)?;
            response.await.unwrap_or(Err(FabricError::Closed))
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FabricError::Cancelled),
            outcome = tokio::time::timeout(timeout, exchange) => {
                outcome.unwrap_or(Err(FabricError::Timeout(timeout)))
            }
        };

        if matches!(result, Err(FabricError::Timeout(_))) {
            // Still queued or running: let the worker drop it
            task_cancel.cancel();
            debug!(task_id = %task_id, ?timeout, "Dispatch timed out");
        }
        result
    }

    pub fn has_agent(&self, agent_type: AgentType) -> bool {
        self.queues.contains_key(&agent_type)
    }

    /// Stop all workers. In-flight calls are abandoned.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        if let Ok(mut workers) = self.workers.lock() {
            workers.abort_all();
        }
    }
}

impl Drop for TaskFabric {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_worker(
    agent_type: AgentType,
    worker: usize,
    agent: Arc<dyn Agent>,
    queue: Arc<Mutex<mpsc::Receiver<TaskEnvelope>>>,
    shutdown: CancellationToken,
) {
    loop {
        let envelope = {
            let mut rx = queue.lock().await;
            tokio::select! {
                _ = shutdown.cancelled() => None,
                envelope = rx.recv() => envelope,
            }
        };
        let Some(envelope) = envelope else {
            break;
        };

        debug!(
            agent_type = %agent_type,
            worker,
            task_id = %envelope.task_id,
            "Executing task"
        );

        let TaskEnvelope {
            task_id,
            input,
            timeout,
            cancel,
            reply,
        } = envelope;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FabricError::Cancelled),
            outcome = tokio::time::timeout(timeout, agent.execute(input)) => match outcome {
                Ok(Ok(output)) => Ok(output),
                Ok(Err(e)) => Err(FabricError::Agent(e)),
                Err(_) => Err(FabricError::Timeout(timeout)),
            },
        };

        if let Err(e) = &result {
            warn!(agent_type = %agent_type, task_id = %task_id, error = %e, "Task failed");
        }

        // The caller may have given up already
        let _ = reply.send(result);
    }
}
