//! Pipeline domain module
//!
//! Stage payloads for the five agents and the logical steps a plan expands
//! into.

pub mod payloads;
pub mod step;

pub use payloads::{
    ActionInput, ActionOutput, AgentInput, AgentOutput, DecisionInput, DecisionOutput, PlanStep,
    PlannerInput, PlannerOutput, RetrieverInput, RetrieverOutput, SummarizerInput,
    SummarizerOutput,
};
pub use step::{Step, StepResult};
