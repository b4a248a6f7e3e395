//! Logical steps and their results.

use crate::citation::Citation;
use crate::core::ids::ActionId;
use crate::pipeline::payloads::PlanStep;
use serde::{Deserialize, Serialize};

/// A planner step bound to its position in the plan.
///
/// Steps are not persisted as entities; each spawns one retriever,
/// summarizer and decision task carrying its index.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub index: u32,
    pub plan: PlanStep,
}

impl Step {
    pub fn from_plan(steps: Vec<PlanStep>) -> Vec<Step> {
        steps
            .into_iter()
            .enumerate()
            .map(|(i, plan)| Step {
                index: i as u32,
                plan,
            })
            .collect()
    }

    /// Split into consecutive batches that may run concurrently.
    ///
    /// A batch is either a single dependent step or a maximal run of
    /// independent steps. Batches keep planner order.
    pub fn batches(steps: &[Step]) -> Vec<Vec<Step>> {
        let mut batches: Vec<Vec<Step>> = Vec::new();
        for step in steps {
            match batches.last_mut() {
                Some(batch)
                    if step.plan.independent && batch.iter().all(|s| s.plan.independent) =>
                {
                    batch.push(step.clone())
                }
                _ => batches.push(vec![step.clone()]),
            }
        }
        batches
    }
}

/// Outcome of one step, kept in the request output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub index: u32,
    pub goal: String,
    pub summary: String,
    /// Verified citations only
    pub citations: Vec<Citation>,
    /// False when the summary is surfaced degraded
    pub verified: bool,
    #[serde(default)]
    pub unverified_tokens: Vec<String>,
    #[serde(default)]
    pub action_ids: Vec<ActionId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(independent: &[bool]) -> Vec<Step> {
        Step::from_plan(
            independent
                .iter()
                .enumerate()
                .map(|(i, ind)| {
                    let s = PlanStep::new(format!("q{}", i), "g");
                    if *ind { s.independent() } else { s }
                })
                .collect(),
        )
    }

    fn shape(batches: &[Vec<Step>]) -> Vec<Vec<u32>> {
        batches
            .iter()
            .map(|b| b.iter().map(|s| s.index).collect())
            .collect()
    }

    #[test]
    fn test_dependent_steps_are_sequential() {
        let steps = plan(&[false, false, false]);
        assert_eq!(shape(&Step::batches(&steps)), vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn test_independent_runs_are_grouped() {
        let steps = plan(&[true, true, false, true, true]);
        assert_eq!(
            shape(&Step::batches(&steps)),
            vec![vec![0, 1], vec![2], vec![3, 4]]
        );
    }
}
