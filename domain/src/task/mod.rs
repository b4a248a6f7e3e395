//! Task domain module
//!
//! A task records one agent invocation: its typed input, its output and its
//! lifecycle `pending → running → succeeded | failed`.

pub mod entities;

pub use entities::{AgentType, FailureReason, Task, TaskStatus, TaskTransition};
