//! CLI command definitions

use attest_domain::EventType;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Per-step summaries, citation excerpts and task attempts
    Full,
    /// Final summary, citations and pending action ids
    Summary,
    /// JSON output
    Json,
}

impl From<OutputFormat> for attest_domain::OutputFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Full => attest_domain::OutputFormat::Full,
            OutputFormat::Summary => attest_domain::OutputFormat::Summary,
            OutputFormat::Json => attest_domain::OutputFormat::Json,
        }
    }
}

/// CLI arguments for attest
#[derive(Parser, Debug)]
#[command(name = "attest")]
#[command(author, version, about = "Citation-grounded answers over your documents, with human-approved actions")]
#[command(long_about = r#"
attest answers questions over ingested documents through a planner,
retriever, summarizer and decision pipeline. Every summary claim must cite a
retrieved passage. Side-effecting actions wait as pending until an approver
resolves them, and every state change is recorded in a tamper-evident
audit ledger.

Configuration files are loaded from (in priority order):
1. ATTEST_* environment variables   e.g. ATTEST_ORCHESTRATOR__TOP_N=8
2. --config <path>                  Explicit config file
3. ./attest.toml                    Project-level config
4. ~/.config/attest/config.toml     Global config

Example:
  attest ingest incidents.txt
  attest query "Summarize login incidents"
  attest pending
  attest resolve <action-id> --approve
  attest verify-ledger
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Acting user id (defaults to $USER)
    #[arg(short, long, global = true, value_name = "ID")]
    pub user: Option<String>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "summary")]
    pub format: OutputFormat,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Disable loading of configuration files
    #[arg(long, global = true)]
    pub no_config: bool,

    /// Show configuration file locations and exit
    #[arg(long)]
    pub show_config: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ingest a document for retrieval
    Ingest {
        path: PathBuf,
        /// MIME type; guessed from the extension when omitted
        #[arg(long, value_name = "MIME")]
        content_type: Option<String>,
    },

    /// Ask a question and run it through the pipeline
    Query { query: String },

    /// List pending actions visible to the user
    Pending,

    /// Approve or reject a pending action
    Resolve {
        action_id: String,
        #[command(flatten)]
        decision: Decision,
        /// Signature recorded with the decision
        #[arg(long)]
        signature: Option<String>,
    },

    /// List the passages of a document
    Passages { document_id: String },

    /// Delete a document, its passages and its index entries
    Delete { document_id: String },

    /// Inspect a request with its tasks, actions and phase history
    Request { request_id: String },

    /// Cancel a running request
    Cancel { request_id: String },

    /// Status history of an action, rebuilt from the ledger
    History { action_id: String },

    /// Query the audit ledger
    Audit(AuditArgs),

    /// Walk the audit hash chain and report the first broken link
    VerifyLedger,

    /// Fail requests left running by a previous process
    Recover,
}

/// Exactly one of `--approve` or `--reject`
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct Decision {
    #[arg(long)]
    pub approve: bool,
    #[arg(long)]
    pub reject: bool,
}

/// Ledger filters
#[derive(Args, Debug, Default)]
pub struct AuditArgs {
    #[arg(long, value_name = "ID")]
    pub request: Option<String>,

    #[arg(long, value_name = "ID")]
    pub task: Option<String>,

    /// Event type, e.g. action_approved
    #[arg(long = "type", value_name = "TYPE")]
    pub event_type: Option<EventType>,

    /// Actor, e.g. user:alice or agent:planner
    #[arg(long)]
    pub actor: Option<String>,

    /// Inclusive lower bound (RFC 3339)
    #[arg(long)]
    pub since: Option<DateTime<Utc>>,

    /// Exclusive upper bound (RFC 3339)
    #[arg(long)]
    pub until: Option<DateTime<Utc>>,

    /// Show at most this many events
    #[arg(long)]
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_resolve_requires_a_decision() {
        assert!(Cli::try_parse_from(["attest", "resolve", "a1"]).is_err());
        assert!(Cli::try_parse_from(["attest", "resolve", "a1", "--approve", "--reject"]).is_err());

        let cli = Cli::try_parse_from(["attest", "resolve", "a1", "--reject", "-u", "carol"]).unwrap();
        match cli.command {
            Some(Command::Resolve { decision, .. }) => {
                assert!(!decision.approve && decision.reject)
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(cli.user.as_deref(), Some("carol"));
    }

    #[test]
    fn test_audit_filters_parse() {
        let cli = Cli::try_parse_from([
            "attest",
            "audit",
            "--type",
            "action_approved",
            "--since",
            "2026-01-01T00:00:00Z",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Some(Command::Audit(args)) => {
                assert_eq!(args.event_type, Some(EventType::ActionApproved));
                assert!(args.since.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
