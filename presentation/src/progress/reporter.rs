//! Progress reporting while a request moves through the pipeline

use attest_application::PipelineProgress;
use attest_domain::{AgentType, FailureReason, RequestId, RequestPhase};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

/// Spinner that follows the request phase
pub struct ProgressReporter {
    spinner: ProgressBar,
    steps: Mutex<Option<usize>>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(Self::spinner_style());
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner.set_prefix("attest");
        Self {
            spinner,
            steps: Mutex::new(None),
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {prefix:.bold.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn phase_display_name(phase: RequestPhase) -> &'static str {
        match phase {
            RequestPhase::Created => "Queued",
            RequestPhase::Planning => "Planning",
            RequestPhase::Retrieving => "Retrieving passages",
            RequestPhase::Summarizing => "Summarizing",
            RequestPhase::Deciding => "Proposing actions",
            RequestPhase::Acting => "Acting",
            RequestPhase::Finalizing => "Finalizing",
            RequestPhase::Completed => "Completed",
            RequestPhase::Failed => "Failed",
        }
    }

    fn step_label(&self, step: Option<u32>) -> String {
        let total = *self.steps.lock().unwrap_or_else(|e| e.into_inner());
        match (step, total) {
            (Some(step), Some(total)) => format!(" [step {}/{}]", step + 1, total),
            (Some(step), None) => format!(" [step {}]", step + 1),
            _ => String::new(),
        }
    }

    /// Stop the spinner and clear its line
    pub fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

impl PipelineProgress for ProgressReporter {
    fn on_phase(&self, _request_id: &RequestId, phase: RequestPhase, step: Option<u32>) {
        self.spinner.set_message(format!(
            "{}{}",
            Self::phase_display_name(phase),
            self.step_label(step)
        ));
    }

    fn on_plan(&self, _request_id: &RequestId, steps: usize) {
        *self.steps.lock().unwrap_or_else(|e| e.into_inner()) = Some(steps);
        self.spinner
            .println(format!("{} plan with {} step(s)", "v".green(), steps));
    }

    fn on_task_complete(&self, agent_type: AgentType, success: bool) {
        if !success {
            self.spinner
                .println(format!("{} {} attempt failed", "x".red(), agent_type));
        }
    }

    fn on_retry(&self, agent_type: AgentType, reason: FailureReason, delay: Duration) {
        self.spinner.println(format!(
            "{} retrying {} after {} in {}ms",
            "~".yellow(),
            agent_type,
            reason,
            delay.as_millis()
        ));
    }

    fn on_citation_mismatch(&self, step: u32, offending: &[String]) {
        self.spinner.println(format!(
            "{} step {} cited unknown passages: {}",
            "!".yellow(),
            step + 1,
            offending.join(", ")
        ));
    }
}

/// Simple text-based progress (no fancy UI)
pub struct SimpleProgress;

impl PipelineProgress for SimpleProgress {
    fn on_phase(&self, _request_id: &RequestId, phase: RequestPhase, step: Option<u32>) {
        let step = step.map(|s| format!(" (step {})", s + 1)).unwrap_or_default();
        eprintln!(
            "{} {}{}",
            "->".cyan(),
            ProgressReporter::phase_display_name(phase).bold(),
            step
        );
    }

    fn on_task_complete(&self, agent_type: AgentType, success: bool) {
        if success {
            eprintln!("  {} {}", "v".green(), agent_type);
        } else {
            eprintln!("  {} {} (failed)", "x".red(), agent_type);
        }
    }

    fn on_retry(&self, agent_type: AgentType, reason: FailureReason, delay: Duration) {
        eprintln!(
            "  {} {} retry after {} ({}ms)",
            "~".yellow(),
            agent_type,
            reason,
            delay.as_millis()
        );
    }
}
