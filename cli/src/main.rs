//! CLI entrypoint for attest
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

mod wiring;

use anyhow::{Context, Result, bail};
use attest_application::{ActorSignature, IngestInput, SubmitQueryInput};
use attest_domain::{
    Actor, ActionId, AuditFilter, DocumentId, OutputFormat, RequestId, TaskId,
};
use attest_infrastructure::config::FileLoggingConfig;
use attest_infrastructure::{ConfigLoader, FileConfig};
use attest_presentation::{
    AuditArgs, Cli, Command, ConsoleFormatter, ProgressReporter, SimpleProgress,
};
use clap::Parser;
use std::io::IsTerminal;
use std::path::Path;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use wiring::Services;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.show_config {
        ConfigLoader::print_config_sources(cli.config.as_ref());
        return Ok(());
    }

    let config = if cli.no_config {
        ConfigLoader::load_defaults()
    } else {
        ConfigLoader::load(cli.config.as_ref())
            .map_err(|e| anyhow::anyhow!("failed to load configuration: {}", e))?
    };
    config.validate()?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _guard = init_logging(cli.verbose, &config.logging)?;

    let Some(command) = cli.command else {
        bail!("No command given. Run `attest --help` for usage.");
    };

    info!("Starting attest");

    let services = Services::build(&config)?;
    let format: OutputFormat = cli.format.into();
    let user = acting_user(cli.user.as_deref())?;

    let result = run(&services, command, &user, format, cli.quiet).await;
    services.shutdown();
    result
}

fn init_logging(verbose: u8, logging: &FileLoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    let stderr = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let (file, guard) = match &logging.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory)
                .with_context(|| format!("creating log directory {}", directory.display()))?;
            let appender = tracing_appender::rolling::daily(directory, &logging.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .init();
    Ok(guard)
}

fn acting_user(flag: Option<&str>) -> Result<String> {
    flag.map(str::to_string)
        .or_else(|| std::env::var("USER").ok())
        .filter(|u| !u.trim().is_empty())
        .context("no acting user; pass --user or set $USER")
}

/// Fail requests stranded by a previous process before touching state.
async fn recover(services: &Services, format: OutputFormat, quiet: bool) -> Result<()> {
    let report = services.orchestrator.recover_orphans().await?;
    if !report.is_empty() && !quiet && format != OutputFormat::Json {
        eprint!("{}", ConsoleFormatter::format_recovery(&report, format));
    }
    Ok(())
}

async fn run(
    services: &Services,
    command: Command,
    user: &str,
    format: OutputFormat,
    quiet: bool,
) -> Result<()> {
    match command {
        Command::Ingest { path, content_type } => {
            let ingest = services.ingest()?;
            recover(services, format, quiet).await?;
            let blob = tokio::fs::read(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            let content_type = content_type.unwrap_or_else(|| guess_content_type(&path).into());
            let output = ingest
                .execute(IngestInput::new(user, filename, content_type, blob))
                .await?;
            print!("{}", ConsoleFormatter::format_ingest(&output, format));
        }

        Command::Query { query } => {
            services.ensure_pipeline()?;
            recover(services, format, quiet).await?;
            let input = SubmitQueryInput::new(user, query);
            let orchestrator = &services.orchestrator;
            let result = if quiet {
                orchestrator.submit(input).await
            } else if std::io::stderr().is_terminal() {
                let reporter = ProgressReporter::new();
                let result = orchestrator.submit_with_progress(input, &reporter).await;
                reporter.finish();
                result
            } else {
                orchestrator.submit_with_progress(input, &SimpleProgress).await
            };
            let response = result?;
            print!("{}", ConsoleFormatter::format_response(&response, format));
        }

        Command::Pending => {
            let actions = services.approval.list_pending(user).await?;
            print!("{}", ConsoleFormatter::format_actions(&actions, format));
        }

        Command::Resolve {
            action_id,
            decision,
            signature,
        } => {
            recover(services, format, quiet).await?;
            let mut actor = ActorSignature::new(user);
            if let Some(signature) = signature {
                actor = actor.with_signature(signature);
            }
            let action = services
                .approval
                .resolve(&ActionId::new(action_id), decision.approve, &actor)
                .await?;
            print!("{}", ConsoleFormatter::format_action(&action, format));
        }

        Command::Passages { document_id } => {
            let (_, passages) = services
                .documents(false)?
                .passages(&DocumentId::new(document_id), user)
                .await?;
            print!("{}", ConsoleFormatter::format_passages(&passages, format));
        }

        Command::Delete { document_id } => {
            let documents = services.documents(true)?;
            recover(services, format, quiet).await?;
            let document = documents
                .delete(&DocumentId::new(document_id), user)
                .await?;
            if format == OutputFormat::Json {
                println!("{}", ConsoleFormatter::format_json(&document));
            } else {
                println!("Deleted {} ({})", document.id, document.filename);
            }
        }

        Command::Request { request_id } => {
            let request_id = RequestId::new(request_id);
            let details = services.audit.inspect(&request_id, user).await?;
            let history = services.audit.request_history(&request_id).await?;
            print!(
                "{}",
                ConsoleFormatter::format_request(&details, &history, format)
            );
        }

        Command::Cancel { request_id } => {
            recover(services, format, quiet).await?;
            let request = services
                .orchestrator
                .cancel(&RequestId::new(request_id), user)
                .await?;
            if format == OutputFormat::Json {
                println!("{}", ConsoleFormatter::format_json(&request));
            } else {
                println!("Cancelled {} ({})", request.id, request.phase);
            }
        }

        Command::History { action_id } => {
            let history = services
                .audit
                .action_history(&ActionId::new(action_id))
                .await?;
            print!(
                "{}",
                ConsoleFormatter::format_action_history(&history, format)
            );
        }

        Command::Audit(args) => {
            let limit = args.limit;
            let mut events = services.audit.events(audit_filter(args)).await?;
            if let Some(limit) = limit {
                events.truncate(limit);
            }
            print!("{}", ConsoleFormatter::format_events(&events, format));
        }

        Command::VerifyLedger => {
            let verification = services.audit.verify().await?;
            print!(
                "{}",
                ConsoleFormatter::format_verification(&verification, format)
            );
            if verification.broken.is_some() {
                bail!("audit ledger failed verification");
            }
        }

        Command::Recover => {
            let report = services.orchestrator.recover_orphans().await?;
            print!("{}", ConsoleFormatter::format_recovery(&report, format));
        }
    }
    Ok(())
}

fn audit_filter(args: AuditArgs) -> AuditFilter {
    AuditFilter {
        request_id: args.request.map(RequestId::new),
        task_id: args.task.map(TaskId::new),
        event_type: args.event_type,
        actor: args.actor.as_deref().map(Actor::parse),
        since: args.since,
        until: args.until,
    }
}

fn guess_content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("pdf") => "application/pdf",
        Some("txt") | Some("log") => "text/plain",
        Some("md") => "text/markdown",
        Some("csv") => "text/csv",
        Some("html") | Some("htm") => "text/html",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        _ => "application/octet-stream",
    }
}
