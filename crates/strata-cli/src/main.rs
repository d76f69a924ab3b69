//! Strata CLI
//!
//! The `strata` command drives tiered context memory from a shell.
//!
//! ## Commands
//!
//! - `session`: start, resume, pause, end or list sessions
//! - `turn`: record one turn of structural events (JSON)
//! - `write`: append a single ledger entry
//! - `query`: recall ledger entries with their reasoning
//! - `context`: show the compressed working context
//! - `checkpoint`: snapshot the working context now
//! - `promote`: push durable facts to long-term memory
//! - `memory`: search long-term memory
//! - `artifact`: inspect and review versioned artifacts

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use strata_core::obs::SessionSpan;
use strata_core::{
    Actor, ArtifactRecord, EntryType, HttpMemoryGateway, InMemoryGateway, InlineComment,
    LedgerEntry, LedgerFilter, MemoryGateway, Namespace, NewLedgerEntry, PromotionReport,
    ReviewAction, ReviewSubmission, SessionCoordinator, SessionId, SessionOutcome, Stores,
    StrataConfig, StructuralEvent, SurrealHandle, Unconfigured,
};
use tracing::{warn, Level};

#[derive(Parser)]
#[command(name = "strata")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tiered context memory for orchestration agents", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Result format on stdout
    #[arg(long, global = true, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// TOML config file (default: STRATA_* environment variables)
    #[arg(long, global = true, env = "STRATA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Record one turn of structural events
    Turn {
        session: String,

        /// JSON array of events, or `-` for stdin
        #[arg(short, long)]
        events: PathBuf,
    },

    /// Append a single ledger entry
    Write {
        session: String,

        /// Entry type (decision, constraint, research-finding, ...)
        #[arg(short = 't', long = "type", value_parser = parse_entry_type)]
        entry_type: EntryType,

        #[arg(long, default_value = "general")]
        scope: String,

        #[arg(short, long)]
        summary: String,

        #[arg(short, long)]
        reasoning: Option<String>,

        #[arg(long, default_value = "orchestrator")]
        source: String,
    },

    /// Recall ledger entries
    Query {
        session: String,

        /// Only these entry types (repeatable)
        #[arg(short = 't', long = "type", value_parser = parse_entry_type)]
        types: Vec<EntryType>,

        /// Only these scopes (repeatable)
        #[arg(long)]
        scope: Vec<String>,

        /// Only entries after this sequence number
        #[arg(long)]
        since: Option<u64>,

        /// Only entries not yet promoted
        #[arg(long)]
        unpromoted: bool,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show the working context of a session
    Context { session: String },

    /// Snapshot the working context now
    Checkpoint { session: String },

    /// Promote the session's durable facts to long-term memory
    Promote { session: String },

    /// Search long-term memory
    Memory {
        #[arg(long)]
        owner: String,

        #[arg(long, value_enum, default_value_t = Concern::ProjectFacts)]
        namespace: Concern,

        #[arg(short, long)]
        query: String,

        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,
    },

    /// Inspect and review artifacts
    Artifact {
        #[command(subcommand)]
        action: ArtifactAction,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Open a session for an owner
    Start {
        #[arg(long)]
        owner: String,

        #[arg(short, long)]
        intent: String,
    },
    /// Reload a paused session
    Resume { session: String },
    /// Checkpoint and pause
    Pause { session: String },
    /// Close the session and promote its durable facts
    End {
        session: String,

        /// Mark abandoned instead of completed
        #[arg(long)]
        abandon: bool,
    },
    /// List sessions
    List {
        #[arg(long)]
        owner: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Concern {
    ProjectFacts,
    Preferences,
}

#[derive(Subcommand)]
enum ArtifactAction {
    /// Artifacts of a session
    List { session: String },
    /// One artifact with its current content
    Show { artifact: String },
    /// Version history
    Versions { artifact: String },
    /// Review history
    Reviews { artifact: String },
    /// Submit a human review of the current version
    Review {
        artifact: String,

        /// Version being reviewed
        #[arg(long = "reviewed")]
        version: u32,

        #[arg(short, long, value_parser = parse_review_action)]
        action: ReviewAction,

        #[arg(long)]
        reviewer: String,

        #[arg(short, long)]
        feedback: Option<String>,

        /// Inline comment as `anchor=comment` (repeatable)
        #[arg(long = "comment", value_parser = parse_inline_comment)]
        comments: Vec<InlineComment>,

        /// Publisher settings for `publish` reviews (JSON)
        #[arg(long)]
        target_config: Option<String>,
    },
    /// Publish an approved artifact
    Publish {
        artifact: String,

        #[arg(long)]
        reviewer: String,

        #[arg(long)]
        target_config: Option<String>,
    },
    /// Retry a failed publish
    RetryPublish {
        artifact: String,

        #[arg(long)]
        reviewer: String,

        #[arg(long)]
        target_config: Option<String>,
    },
    /// Hand the latest revision request to the reviser
    Revise { artifact: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    strata_core::init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref())?;
    let handle = SurrealHandle::from_env()
        .await
        .context("Failed to connect to Strata database")?;
    let coordinator = build_coordinator(config, Stores::surreal(&handle))?;
    let out = cli.format;

    match cli.command {
        Commands::Session { action } => match action {
            SessionAction::Start { owner, intent } => {
                cmd_session_start(&coordinator, &owner, &intent, out)
                    .await
                    .map(|_| ())
            }
            SessionAction::Resume { session } => {
                let _span = SessionSpan::enter(&session);
                cmd_session_resume(&coordinator, &session.into(), out).await
            }
            SessionAction::Pause { session } => {
                let _span = SessionSpan::enter(&session);
                cmd_session_pause(&coordinator, &session.into(), out).await
            }
            SessionAction::End { session, abandon } => {
                let _span = SessionSpan::enter(&session);
                cmd_session_end(&coordinator, &session.into(), abandon, out).await
            }
            SessionAction::List { owner } => {
                cmd_session_list(&coordinator, owner.as_deref(), out).await
            }
        },
        Commands::Turn { session, events } => {
            let _span = SessionSpan::enter(&session);
            let events = read_events(&events)?;
            cmd_turn(&coordinator, &session.into(), events, out).await
        }
        Commands::Write {
            session,
            entry_type,
            scope,
            summary,
            reasoning,
            source,
        } => {
            let _span = SessionSpan::enter(&session);
            let mut entry = NewLedgerEntry::new(entry_type, scope, summary, source);
            entry.reasoning = reasoning;
            cmd_write(&coordinator, &session.into(), entry, out).await
        }
        Commands::Query {
            session,
            types,
            scope,
            since,
            unpromoted,
            limit,
        } => {
            let filter = build_filter(types, scope, since, unpromoted);
            cmd_query(&coordinator, &session.into(), &filter, limit, out)
                .await
                .map(|_| ())
        }
        Commands::Context { session } => {
            let _span = SessionSpan::enter(&session);
            cmd_context(&coordinator, &session.into(), out).await
        }
        Commands::Checkpoint { session } => {
            let _span = SessionSpan::enter(&session);
            cmd_checkpoint(&coordinator, &session.into(), out).await
        }
        Commands::Promote { session } => {
            let _span = SessionSpan::enter(&session);
            cmd_promote(&coordinator, &session.into(), out).await
        }
        Commands::Memory {
            owner,
            namespace,
            query,
            top_k,
        } => cmd_memory(&coordinator, &namespace_for(namespace, &owner), &query, top_k, out).await,
        Commands::Artifact { action } => cmd_artifact(&coordinator, action, out).await,
    }
}

// -- wiring ---------------------------------------------------------------

fn load_config(path: Option<&Path>) -> Result<StrataConfig> {
    let config = match path {
        Some(path) => StrataConfig::from_file(path)?,
        None => StrataConfig::from_env()?,
    };
    Ok(config)
}

/// Coordinator over `stores`. Long-term memory is the HTTP service when
/// `gateway.url` is set, otherwise a process-local store.
fn build_coordinator(config: StrataConfig, stores: Stores) -> Result<SessionCoordinator> {
    let gateway: Arc<dyn MemoryGateway> = if config.gateway.url.is_some() {
        Arc::new(HttpMemoryGateway::from_config(&config.gateway)?)
    } else {
        warn!("STRATA_MEMORY_URL not set; long-term memory will not outlive this process");
        Arc::new(InMemoryGateway::new())
    };
    Ok(SessionCoordinator::new(
        config,
        stores,
        gateway,
        Arc::new(Unconfigured),
        Arc::new(Unconfigured),
    )?)
}

fn parse_entry_type(s: &str) -> std::result::Result<EntryType, String> {
    EntryType::parse(s).ok_or_else(|| {
        let known: Vec<&str> = EntryType::ALL.iter().map(|t| t.as_str()).collect();
        format!("unknown entry type '{s}' (expected one of: {})", known.join(", "))
    })
}

fn parse_review_action(s: &str) -> std::result::Result<ReviewAction, String> {
    ReviewAction::parse(s).ok_or_else(|| {
        format!("unknown review action '{s}' (approve, request_revision, reject, publish)")
    })
}

fn parse_inline_comment(s: &str) -> std::result::Result<InlineComment, String> {
    let (anchor, comment) = s
        .split_once('=')
        .ok_or_else(|| format!("expected anchor=comment, got '{s}'"))?;
    if anchor.trim().is_empty() || comment.trim().is_empty() {
        return Err(format!("expected anchor=comment, got '{s}'"));
    }
    Ok(InlineComment {
        anchor: anchor.trim().to_string(),
        comment: comment.trim().to_string(),
    })
}

fn parse_target_config(raw: Option<&str>) -> Result<serde_json::Value> {
    match raw {
        Some(raw) => serde_json::from_str(raw).context("--target-config is not valid JSON"),
        None => Ok(serde_json::Value::Null),
    }
}

fn namespace_for(concern: Concern, owner: &str) -> Namespace {
    match concern {
        Concern::ProjectFacts => Namespace::project_facts(owner),
        Concern::Preferences => Namespace::preferences(owner),
    }
}

fn build_filter(
    types: Vec<EntryType>,
    scopes: Vec<String>,
    since: Option<u64>,
    unpromoted: bool,
) -> LedgerFilter {
    let mut filter = LedgerFilter::all();
    if !types.is_empty() {
        filter = filter.with_types(types);
    }
    if !scopes.is_empty() {
        filter = filter.with_scopes(scopes);
    }
    if let Some(since) = since {
        filter = filter.since(since);
    }
    if unpromoted {
        filter = filter.unpromoted();
    }
    filter
}

fn read_events(path: &Path) -> Result<Vec<StructuralEvent>> {
    let raw = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read events from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path).context(format!("Failed to read {:?}", path))?
    };
    parse_events(&raw)
}

fn parse_events(raw: &str) -> Result<Vec<StructuralEvent>> {
    serde_json::from_str(raw).context("Events must be a JSON array of structural events")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// -- sessions -------------------------------------------------------------

async fn cmd_session_start(
    coordinator: &SessionCoordinator,
    owner: &str,
    intent: &str,
    out: Format,
) -> Result<SessionId> {
    let context = coordinator.start_session(owner, intent).await?;
    match out {
        Format::Json => print_json(&context)?,
        Format::Text => {
            println!("Started session {}", context.session_id);
            println!();
            print!("{}", context.render_summary());
        }
    }
    Ok(context.session_id)
}

async fn cmd_session_resume(
    coordinator: &SessionCoordinator,
    session_id: &SessionId,
    out: Format,
) -> Result<()> {
    let context = coordinator.resume_session(session_id).await?;
    match out {
        Format::Json => print_json(&context)?,
        Format::Text => {
            println!("Resumed session {}", session_id);
            println!();
            print!("{}", context.render_summary());
        }
    }
    Ok(())
}

async fn cmd_session_pause(
    coordinator: &SessionCoordinator,
    session_id: &SessionId,
    out: Format,
) -> Result<()> {
    let session = coordinator.pause_session(session_id).await?;
    match out {
        Format::Json => print_json(&session)?,
        Format::Text => println!("Session {} is {}", session.session_id, session.status),
    }
    Ok(())
}

async fn cmd_session_end(
    coordinator: &SessionCoordinator,
    session_id: &SessionId,
    abandon: bool,
    out: Format,
) -> Result<()> {
    let outcome = if abandon {
        SessionOutcome::Abandoned
    } else {
        SessionOutcome::Completed
    };
    let ended = coordinator.end_session(session_id, outcome).await?;
    match out {
        Format::Json => print_json(&serde_json::json!({
            "session": ended.session,
            "promotion": ended.promotion,
        }))?,
        Format::Text => {
            println!("Session {} is {}", ended.session.session_id, ended.session.status);
            match &ended.promotion {
                Some(report) => print_promotion(report),
                None => println!("Promotion did not run; entries remain eligible"),
            }
        }
    }
    Ok(())
}

async fn cmd_session_list(
    coordinator: &SessionCoordinator,
    owner: Option<&str>,
    out: Format,
) -> Result<()> {
    let sessions = coordinator.list_sessions(owner).await?;
    match out {
        Format::Json => print_json(&sessions)?,
        Format::Text => {
            if sessions.is_empty() {
                println!("No sessions");
            }
            for s in sessions {
                println!(
                    "{}  {:<9}  {}  {}",
                    s.session_id,
                    s.status.as_str(),
                    s.owner_id,
                    s.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
        }
    }
    Ok(())
}

// -- ledger ---------------------------------------------------------------

async fn cmd_turn(
    coordinator: &SessionCoordinator,
    session_id: &SessionId,
    events: Vec<StructuralEvent>,
    out: Format,
) -> Result<()> {
    let outcome = coordinator.process_turn(session_id, events).await?;
    match out {
        Format::Json => print_json(&outcome)?,
        Format::Text => {
            let seqs: Vec<String> = outcome
                .receipts
                .iter()
                .map(|r| r.sequence_num.to_string())
                .collect();
            println!("Turn {}: appended [{}]", outcome.turn, seqs.join(", "));
            if let Some(seq) = outcome.checkpoint {
                println!("Checkpointed at sequence {}", seq);
            }
        }
    }
    Ok(())
}

async fn cmd_write(
    coordinator: &SessionCoordinator,
    session_id: &SessionId,
    entry: NewLedgerEntry,
    out: Format,
) -> Result<()> {
    let receipt = coordinator.write_ledger(session_id, entry).await?;
    match out {
        Format::Json => print_json(&receipt)?,
        Format::Text => println!("#{} {}", receipt.sequence_num, receipt.entry_id),
    }
    Ok(())
}

async fn cmd_query(
    coordinator: &SessionCoordinator,
    session_id: &SessionId,
    filter: &LedgerFilter,
    limit: Option<usize>,
    out: Format,
) -> Result<Vec<LedgerEntry>> {
    let entries = coordinator.recall(session_id, filter, limit).await?;
    match out {
        Format::Json => print_json(&entries)?,
        Format::Text => {
            if entries.is_empty() {
                println!("No matching entries");
            }
            for entry in &entries {
                let promoted = if entry.promoted { " (promoted)" } else { "" };
                println!(
                    "#{:<4} [{}] {}: {}{}",
                    entry.sequence_num, entry.entry_type, entry.scope, entry.summary, promoted
                );
                if let Some(reasoning) = &entry.reasoning {
                    println!("       why: {}", reasoning);
                }
            }
        }
    }
    Ok(entries)
}

async fn cmd_context(
    coordinator: &SessionCoordinator,
    session_id: &SessionId,
    out: Format,
) -> Result<()> {
    let context = coordinator.working_context(session_id).await?;
    match out {
        Format::Json => print_json(&context)?,
        Format::Text => print!("{}", context.render_summary()),
    }
    Ok(())
}

async fn cmd_checkpoint(
    coordinator: &SessionCoordinator,
    session_id: &SessionId,
    out: Format,
) -> Result<()> {
    let snapshot = coordinator.checkpoint(session_id).await?;
    match out {
        Format::Json => print_json(&serde_json::json!({
            "session_id": snapshot.session_id,
            "last_sequence": snapshot.last_sequence,
            "digest": snapshot.digest.as_str(),
            "size_bytes": snapshot.size_bytes,
        }))?,
        Format::Text => println!(
            "Checkpointed session {} at sequence {} ({} bytes, {})",
            snapshot.session_id,
            snapshot.last_sequence,
            snapshot.size_bytes,
            snapshot.digest.short()
        ),
    }
    Ok(())
}

async fn cmd_promote(
    coordinator: &SessionCoordinator,
    session_id: &SessionId,
    out: Format,
) -> Result<()> {
    let report = coordinator.promote(session_id).await?;
    match out {
        Format::Json => print_json(&report)?,
        Format::Text => print_promotion(&report),
    }
    report.ensure_complete()?;
    Ok(())
}

fn print_promotion(report: &PromotionReport) {
    println!(
        "Promoted {} entr{}, {} failed",
        report.promoted_count,
        if report.promoted_count == 1 { "y" } else { "ies" },
        report.failed_count
    );
    for failure in &report.failures {
        println!(
            "  #{} {}: {}",
            failure.sequence_num, failure.code, failure.message
        );
    }
}

async fn cmd_memory(
    coordinator: &SessionCoordinator,
    namespace: &Namespace,
    query: &str,
    top_k: usize,
    out: Format,
) -> Result<()> {
    let hits = coordinator.retrieve_memory(namespace, query, top_k).await?;
    match out {
        Format::Json => print_json(&hits)?,
        Format::Text => {
            if hits.is_empty() {
                println!("Nothing in {} matches '{}'", namespace, query);
            }
            for hit in hits {
                println!("{:.2}  {}", hit.relevance_score, hit.record.content);
            }
        }
    }
    Ok(())
}

// -- artifacts ------------------------------------------------------------

async fn cmd_artifact(
    coordinator: &SessionCoordinator,
    action: ArtifactAction,
    out: Format,
) -> Result<()> {
    let artifacts = coordinator.artifacts();
    match action {
        ArtifactAction::List { session } => {
            let list = artifacts.list_artifacts(&session.into()).await?;
            match out {
                Format::Json => print_json(&list)?,
                Format::Text => {
                    if list.is_empty() {
                        println!("No artifacts");
                    }
                    for a in &list {
                        print_artifact_line(a);
                    }
                }
            }
        }
        ArtifactAction::Show { artifact } => {
            let a = artifacts.get_artifact(&artifact).await?;
            match out {
                Format::Json => print_json(&a)?,
                Format::Text => {
                    print_artifact_line(&a);
                    if let Some(err) = &a.last_error {
                        println!("last error: {}", err);
                    }
                    if let Some(url) = &a.external_url {
                        println!("published at: {}", url);
                    }
                    println!();
                    println!("{}", a.content);
                }
            }
        }
        ArtifactAction::Versions { artifact } => {
            let versions = artifacts.get_versions(&artifact).await?;
            match out {
                Format::Json => print_json(&versions)?,
                Format::Text => {
                    for v in versions {
                        println!(
                            "v{}  {}  {}  {}",
                            v.version,
                            v.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                            v.author,
                            v.change_summary
                        );
                    }
                }
            }
        }
        ArtifactAction::Reviews { artifact } => {
            let reviews = artifacts.get_reviews(&artifact).await?;
            match out {
                Format::Json => print_json(&reviews)?,
                Format::Text => {
                    for r in reviews {
                        println!(
                            "v{}  {:<16}  {}  {}",
                            r.version_reviewed,
                            r.action.as_str(),
                            r.reviewer,
                            r.feedback.as_deref().unwrap_or("")
                        );
                        for c in &r.inline_comments {
                            println!("      {}: {}", c.anchor, c.comment);
                        }
                    }
                }
            }
        }
        ArtifactAction::Review {
            artifact,
            version,
            action,
            reviewer,
            feedback,
            comments,
            target_config,
        } => {
            let mut submission = ReviewSubmission::new(version, action, Actor::human(reviewer))
                .with_comments(comments);
            if let Some(feedback) = feedback {
                submission = submission.with_feedback(feedback);
            }
            submission.target_config = parse_target_config(target_config.as_deref())?;
            let a = artifacts.submit_review(&artifact, submission).await?;
            report_artifact(&a, out)?;
        }
        ArtifactAction::Publish {
            artifact,
            reviewer,
            target_config,
        } => {
            let config = parse_target_config(target_config.as_deref())?;
            let a = artifacts
                .request_publish(&artifact, &Actor::human(reviewer), &config)
                .await?;
            report_artifact(&a, out)?;
        }
        ArtifactAction::RetryPublish {
            artifact,
            reviewer,
            target_config,
        } => {
            let config = parse_target_config(target_config.as_deref())?;
            let a = artifacts
                .retry_publish(&artifact, &Actor::human(reviewer), &config)
                .await?;
            report_artifact(&a, out)?;
        }
        ArtifactAction::Revise { artifact } => {
            let a = artifacts.dispatch_revision(&artifact).await?;
            report_artifact(&a, out)?;
        }
    }
    Ok(())
}

fn print_artifact_line(a: &ArtifactRecord) {
    println!(
        "{}  v{}  {:<18}  {:<8}  {}",
        a.artifact_id, a.version, a.status, a.artifact_type, a.title
    );
}

fn report_artifact(a: &ArtifactRecord, out: Format) -> Result<()> {
    match out {
        Format::Json => print_json(a)?,
        Format::Text => println!("Artifact {} is {} (v{})", a.artifact_id, a.status, a.version),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{ArtifactStatus, PublishTarget};

    fn coordinator() -> SessionCoordinator {
        build_coordinator(StrataConfig::default(), Stores::in_memory()).unwrap()
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_review_command_with_comments() {
        let cli = Cli::try_parse_from([
            "strata",
            "artifact",
            "review",
            "a-1",
            "--reviewed",
            "2",
            "--action",
            "request_revision",
            "--reviewer",
            "alice",
            "--feedback",
            "Add metrics",
            "--comment",
            "Goals=too vague",
        ])
        .unwrap();
        match cli.command {
            Commands::Artifact {
                action:
                    ArtifactAction::Review {
                        version,
                        action,
                        comments,
                        ..
                    },
            } => {
                assert_eq!(version, 2);
                assert_eq!(action, ReviewAction::RequestRevision);
                assert_eq!(comments[0].anchor, "Goals");
                assert_eq!(comments[0].comment, "too vague");
            }
            _ => panic!("expected artifact review"),
        }
    }

    #[test]
    fn rejects_unknown_entry_type() {
        assert!(parse_entry_type("decision").is_ok());
        assert!(parse_entry_type("research-finding").is_ok());
        let err = parse_entry_type("musing").unwrap_err();
        assert!(err.contains("decision"));
        assert!(parse_inline_comment("no separator").is_err());
        assert!(parse_inline_comment("=empty anchor").is_err());
    }

    #[test]
    fn parses_event_arrays() {
        let events = parse_events(
            r#"[
                {"type": "decision", "scope": "product", "summary": "Mobile-first",
                 "reasoning": "78% mobile", "options": null},
                {"type": "constraint", "scope": "product", "summary": "No email", "reasoning": null}
            ]"#,
        )
        .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].entry_type(), EntryType::Decision);
        assert!(parse_events(r#"{"type": "decision"}"#).is_err());
    }

    #[test]
    fn reads_events_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("turn.json");
        std::fs::write(
            &path,
            r#"[{"type": "research-finding", "scope": "market", "summary": "3 competitors"}]"#,
        )
        .unwrap();
        let events = read_events(&path).unwrap();
        assert_eq!(events[0].entry_type(), EntryType::ResearchFinding);
        assert!(read_events(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn filter_flags_combine() {
        let filter = build_filter(vec![EntryType::Decision], vec!["product".into()], Some(3), true);
        assert_eq!(filter.entry_types, Some(vec![EntryType::Decision]));
        assert_eq!(filter.scopes, Some(vec!["product".to_string()]));
        assert_eq!(filter.since_sequence, Some(3));
        assert_eq!(filter.promoted, Some(false));
        assert_eq!(build_filter(vec![], vec![], None, false), LedgerFilter::all());
    }

    #[tokio::test]
    async fn session_commands_round_trip() {
        let coordinator = coordinator();
        let sid = cmd_session_start(&coordinator, "pm-1", "Plan launch", Format::Text)
            .await
            .unwrap();

        let events = parse_events(
            r#"[{"type": "decision", "scope": "launch", "summary": "Launch in March",
                 "reasoning": "after the freeze", "options": null}]"#,
        )
        .unwrap();
        cmd_turn(&coordinator, &sid, events, Format::Json).await.unwrap();
        cmd_write(
            &coordinator,
            &sid,
            NewLedgerEntry::new(EntryType::Constraint, "launch", "Budget capped", "pm-1"),
            Format::Text,
        )
        .await
        .unwrap();

        let decisions = cmd_query(
            &coordinator,
            &sid,
            &build_filter(vec![EntryType::Decision], vec![], None, false),
            None,
            Format::Text,
        )
        .await
        .unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].reasoning.as_deref(), Some("after the freeze"));

        cmd_context(&coordinator, &sid, Format::Text).await.unwrap();
        cmd_checkpoint(&coordinator, &sid, Format::Text).await.unwrap();
        cmd_promote(&coordinator, &sid, Format::Text).await.unwrap();
        cmd_memory(
            &coordinator,
            &Namespace::project_facts("pm-1"),
            "launch march",
            5,
            Format::Text,
        )
        .await
        .unwrap();
        cmd_session_list(&coordinator, Some("pm-1"), Format::Text)
            .await
            .unwrap();
        cmd_session_end(&coordinator, &sid, false, Format::Text)
            .await
            .unwrap();
        assert!(cmd_context(&coordinator, &sid, Format::Text).await.is_err());
    }

    #[tokio::test]
    async fn publish_without_a_publisher_lands_in_publish_failed() {
        let coordinator = coordinator();
        let sid = cmd_session_start(&coordinator, "pm-1", "Docs", Format::Text)
            .await
            .unwrap();
        let artifact = coordinator
            .create_artifact(&sid, "prd", PublishTarget::DocumentRepository, "PRD", "body", "writer")
            .await
            .unwrap();
        let id = artifact.artifact_id.clone();
        coordinator.submit_artifact_for_review(&sid, &id).await.unwrap();

        cmd_artifact(
            &coordinator,
            ArtifactAction::Review {
                artifact: id.clone(),
                version: 1,
                action: ReviewAction::Approve,
                reviewer: "alice".into(),
                feedback: None,
                comments: vec![],
                target_config: None,
            },
            Format::Text,
        )
        .await
        .unwrap();

        let err = cmd_artifact(
            &coordinator,
            ArtifactAction::Publish {
                artifact: id.clone(),
                reviewer: "alice".into(),
                target_config: Some(r#"{"space": "PM"}"#.into()),
            },
            Format::Text,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("no publisher configured"), "{err}");

        let a = coordinator.artifacts().get_artifact(&id).await.unwrap();
        assert_eq!(a.status, ArtifactStatus::PublishFailed);

        cmd_artifact(&coordinator, ArtifactAction::Reviews { artifact: id }, Format::Text)
            .await
            .unwrap();
    }
}
