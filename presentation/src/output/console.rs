//! Console output formatter for command results

use attest_application::{IngestOutput, QueryResponse, RecoveryReport, RequestDetails};
use attest_domain::{
    ActionStatus, AuditEvent, ChainVerification, Citation, HistoryEntry, OutputFormat, Passage,
    PendingAction, RequestPhase, RequestStatus, TaskStatus,
};
use colored::Colorize;
use serde::Serialize;

/// Formats command results for console display
pub struct ConsoleFormatter;

impl ConsoleFormatter {
    /// Format a completed query
    pub fn format_response(response: &QueryResponse, format: OutputFormat) -> String {
        match format {
            OutputFormat::Json => Self::format_json(response),
            OutputFormat::Summary => Self::format_summary(response),
            OutputFormat::Full => Self::format_full(response),
        }
    }

    fn format_summary(response: &QueryResponse) -> String {
        let mut output = String::new();

        output.push_str(&format!("{}\n\n", "=== Answer ===".cyan().bold()));
        output.push_str(&response.summary);
        output.push('\n');

        if !response.verified {
            output.push_str(&Self::unverified_warning(&response.unverified_citations));
        }

        if !response.citations.is_empty() {
            output.push_str(&format!("\n{}\n", "Citations:".cyan().bold()));
            for (i, citation) in response.citations.iter().enumerate() {
                output.push_str(&format!("  [{}] {}\n", i + 1, Self::citation_ref(citation)));
            }
        }

        output.push_str(&Self::pending_footer(response));
        output.push_str(&format!(
            "\n{} {}\n",
            "Request:".dimmed(),
            response.request_id
        ));
        output
    }

    fn format_full(response: &QueryResponse) -> String {
        let mut output = String::new();

        output.push_str(&Self::header("Request Results"));
        output.push('\n');
        output.push_str(&format!(
            "{} {}\n",
            "Request:".cyan().bold(),
            response.request_id
        ));

        for step in &response.steps {
            output.push_str(&Self::section_header(&format!(
                "Step {}: {}",
                step.index + 1,
                step.goal
            )));
            output.push_str(&format!("\n{}\n", step.summary));
            if !step.verified {
                output.push_str(&Self::unverified_warning(&step.unverified_tokens));
            }
            for citation in &step.citations {
                output.push_str(&format!(
                    "\n  {} (score {:.4})\n{}\n",
                    Self::citation_ref(citation).yellow(),
                    citation.relevance_score,
                    Self::indent(&citation.text, "    ")
                ));
            }
            if !step.action_ids.is_empty() {
                output.push_str(&format!(
                    "\n  {} {}\n",
                    "Proposed:".dimmed(),
                    step.action_ids
                        .iter()
                        .map(|id| id.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            }
        }

        output.push_str(&Self::section_header("Final Summary"));
        output.push_str(&format!("\n{}\n", response.summary));
        output.push_str(&Self::pending_footer(response));
        output.push_str(&Self::footer());
        output
    }

    /// Format the result of an ingestion
    pub fn format_ingest(result: &IngestOutput, format: OutputFormat) -> String {
        if format == OutputFormat::Json {
            return Self::format_json(result);
        }
        format!(
            "{} {} ({} passages)\n{} {}\n",
            "Ingested".green().bold(),
            result.filename,
            result.passages_count,
            "Document:".dimmed(),
            result.document_id
        )
    }

    /// Format a list of actions
    pub fn format_actions(actions: &[PendingAction], format: OutputFormat) -> String {
        if format == OutputFormat::Json {
            return Self::format_json(actions);
        }
        if actions.is_empty() {
            return format!("{}\n", "No pending actions.".dimmed());
        }
        let mut output = String::new();
        for action in actions {
            output.push_str(&format!(
                "{} {} -> {} (confidence {:.2})\n",
                action.id.to_string().bold(),
                action.action_type,
                action.target_service.yellow(),
                action.confidence
            ));
            if format == OutputFormat::Full {
                output.push_str(&format!("  request: {}\n", action.request_id));
                output.push_str(&Self::indent(&Self::pretty(&action.payload), "  "));
                output.push('\n');
            }
        }
        output
    }

    /// Format one action after it was resolved
    pub fn format_action(action: &PendingAction, format: OutputFormat) -> String {
        if format == OutputFormat::Json {
            return Self::format_json(action);
        }
        let mut output = format!(
            "{} {} is {}\n",
            "Action".bold(),
            action.id,
            Self::action_status(action.status)
        );
        if let Some(by) = &action.approved_by {
            output.push_str(&format!("  {} {}\n", "approved by:".dimmed(), by));
        }
        if let Some(result) = &action.result {
            output.push_str(&Self::indent(&Self::pretty(result), "  "));
            output.push('\n');
        }
        output
    }

    /// Format the passages of a document
    pub fn format_passages(passages: &[Passage], format: OutputFormat) -> String {
        if format == OutputFormat::Json {
            return Self::format_json(passages);
        }
        let mut output = String::new();
        for passage in passages {
            let page = passage
                .page
                .map(|p| format!(" p.{}", p))
                .unwrap_or_default();
            output.push_str(&format!(
                "{} {}{} [{}..{}]\n",
                format!("#{}", passage.index).cyan(),
                passage.id,
                page,
                passage.char_start,
                passage.char_end
            ));
            let text = match format {
                OutputFormat::Full => passage.text.clone(),
                _ => Self::excerpt(&passage.text, 100),
            };
            output.push_str(&Self::indent(&text, "    "));
            output.push('\n');
        }
        output
    }

    /// Format a request with its tasks, actions and phase history
    pub fn format_request(
        details: &RequestDetails,
        history: &[HistoryEntry<RequestPhase>],
        format: OutputFormat,
    ) -> String {
        if format == OutputFormat::Json {
            #[derive(Serialize)]
            struct View<'a> {
                #[serde(flatten)]
                details: &'a RequestDetails,
                history: &'a [HistoryEntry<RequestPhase>],
            }
            return Self::format_json(&View { details, history });
        }

        let request = &details.request;
        let mut output = String::new();
        output.push_str(&format!(
            "{} {} [{}]\n",
            "Request".bold(),
            request.id,
            Self::request_status(request.status)
        ));
        output.push_str(&format!("  {} {}\n", "user:".dimmed(), request.user_id));
        output.push_str(&format!("  {} {}\n", "query:".dimmed(), request.query));
        output.push_str(&format!("  {} {}\n", "phase:".dimmed(), request.phase));
        if let Some(failure) = &request.failure {
            output.push_str(&format!("  {} {}\n", "failure:".red(), failure));
        }

        output.push_str(&Self::section_header("Phases"));
        for entry in history {
            output.push_str(&format!(
                "  #{:<5} {:<12} {}\n",
                entry.sequence,
                entry.state.to_string(),
                entry.actor.dimmed()
            ));
        }

        output.push_str(&Self::section_header("Tasks"));
        for task in &details.tasks {
            let step = task
                .step_index
                .map(|s| format!(" step {}", s + 1))
                .unwrap_or_default();
            output.push_str(&format!(
                "  {:<10}{} attempt {} {}",
                task.agent_type.to_string(),
                step,
                task.attempt,
                Self::task_status(task.status)
            ));
            if let Some(reason) = task.failure_reason {
                output.push_str(&format!(" ({})", reason));
            }
            output.push('\n');
            if format == OutputFormat::Full
                && let Some(error) = &task.error
            {
                output.push_str(&format!("    {}\n", error.dimmed()));
            }
        }

        if !details.actions.is_empty() {
            output.push_str(&Self::section_header("Actions"));
            output.push_str(&Self::format_actions(&details.actions, format));
        }
        output
    }

    /// Format the status history of an action
    pub fn format_action_history(
        history: &[HistoryEntry<ActionStatus>],
        format: OutputFormat,
    ) -> String {
        if format == OutputFormat::Json {
            return Self::format_json(history);
        }
        if history.is_empty() {
            return format!("{}\n", "No recorded history.".dimmed());
        }
        history
            .iter()
            .map(|entry| {
                format!(
                    "#{:<5} {} {}\n",
                    entry.sequence,
                    Self::action_status(entry.state),
                    entry.actor.dimmed()
                )
            })
            .collect()
    }

    /// Format audit events
    pub fn format_events(events: &[AuditEvent], format: OutputFormat) -> String {
        if format == OutputFormat::Json {
            return Self::format_json(events);
        }
        let mut output = String::new();
        for event in events {
            output.push_str(&format!(
                "#{:<6} {} {:<24} {}",
                event.sequence,
                event.timestamp.format("%Y-%m-%d %H:%M:%S%.3f").to_string().dimmed(),
                event.event_type.to_string().cyan(),
                event.actor
            ));
            if let Some(request_id) = &event.request_id {
                output.push_str(&format!(" {}", request_id.to_string().dimmed()));
            }
            output.push('\n');
            if format == OutputFormat::Full {
                output.push_str(&Self::indent(&Self::pretty(&event.details), "    "));
                output.push_str(&format!("\n    {} {}\n", "hash:".dimmed(), event.hash));
            }
        }
        output
    }

    /// Format a chain walk
    pub fn format_verification(verification: &ChainVerification, format: OutputFormat) -> String {
        if format == OutputFormat::Json {
            return Self::format_json(verification);
        }
        match &verification.broken {
            None => format!(
                "{} {} events verified\n",
                "Ledger intact:".green().bold(),
                verification.checked
            ),
            Some(link) => format!(
                "{} at event #{} ({}): {}\n{} {} events verified before the break\n",
                "Ledger broken".red().bold(),
                link.sequence,
                link.event_id,
                link.reason,
                "Note:".dimmed(),
                verification.checked
            ),
        }
    }

    /// Format an orphan recovery pass
    pub fn format_recovery(report: &RecoveryReport, format: OutputFormat) -> String {
        if format == OutputFormat::Json {
            return Self::format_json(report);
        }
        if report.is_empty() {
            return format!("{}\n", "No orphaned requests.".dimmed());
        }
        let mut output = format!(
            "{} {} requests, {} tasks, {} actions\n",
            "Recovered".yellow().bold(),
            report.requests.len(),
            report.tasks,
            report.actions.len()
        );
        for id in &report.requests {
            output.push_str(&format!("  request {}\n", id));
        }
        for id in &report.actions {
            output.push_str(&format!("  action  {}\n", id));
        }
        output
    }

    /// Format any serializable value as JSON
    pub fn format_json<T: Serialize + ?Sized>(value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
    }

    fn citation_ref(citation: &Citation) -> String {
        let page = citation
            .page
            .map(|p| format!(", page {}", p))
            .unwrap_or_default();
        format!(
            "{}{} / {}",
            citation.doc_id, page, citation.passage_id
        )
    }

    fn unverified_warning(tokens: &[String]) -> String {
        format!(
            "\n{} {}\n",
            "UNVERIFIED:".red().bold(),
            if tokens.is_empty() {
                "citations could not be validated".to_string()
            } else {
                format!("unknown citations {}", tokens.join(", "))
            }
        )
    }

    fn pending_footer(response: &QueryResponse) -> String {
        if response.pending_action_ids.is_empty() {
            return String::new();
        }
        let mut output = format!(
            "\n{} {}\n",
            "Pending approval:".yellow().bold(),
            response.pending_action_ids.len()
        );
        for id in &response.pending_action_ids {
            output.push_str(&format!("  {}\n", id));
        }
        output
    }

    fn request_status(status: RequestStatus) -> String {
        match status {
            RequestStatus::Completed => status.to_string().green().to_string(),
            RequestStatus::Failed => status.to_string().red().to_string(),
            _ => status.to_string().yellow().to_string(),
        }
    }

    fn task_status(status: TaskStatus) -> String {
        match status {
            TaskStatus::Succeeded => status.to_string().green().to_string(),
            TaskStatus::Failed => status.to_string().red().to_string(),
            _ => status.to_string().yellow().to_string(),
        }
    }

    fn action_status(status: ActionStatus) -> String {
        match status {
            ActionStatus::Executed | ActionStatus::Approved => status.to_string().green().to_string(),
            ActionStatus::Rejected | ActionStatus::ExecutionFailed => {
                status.to_string().red().to_string()
            }
            ActionStatus::Pending => status.to_string().yellow().to_string(),
        }
    }

    fn pretty(value: &serde_json::Value) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    }

    fn excerpt(text: &str, max_chars: usize) -> String {
        let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if flat.chars().count() <= max_chars {
            flat
        } else {
            format!("{}...", flat.chars().take(max_chars).collect::<String>())
        }
    }

    fn header(title: &str) -> String {
        let line = "=".repeat(60);
        format!("{}\n{:^60}\n{}", line.cyan(), title.bold(), line.cyan())
    }

    fn section_header(title: &str) -> String {
        format!("\n{}\n{}\n", title.cyan().bold(), "-".repeat(40))
    }

    fn footer() -> String {
        format!("\n{}\n", "=".repeat(60).cyan())
    }

    /// Indent a multi-line string
    pub fn indent(text: &str, prefix: &str) -> String {
        text.lines()
            .map(|line| format!("{}{}", prefix, line))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
