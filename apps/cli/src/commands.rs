//! CLI command definitions, routing, and tracing setup.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::Section;
use color_eyre::eyre::{Report, Result, eyre};
use fitscout_core::{Broadcaster, EventSink, Observer, SessionManager, SilentSink};
use fitscout_extractor::{HttpFetcherFactory, MakeExtractor};
use fitscout_shared::{
    AppConfig, Catalog, FitScoutError, HistoryId, LookupConfig, SessionConfig, SessionId,
    init_config, load_config,
};
use fitscout_storage::Storage;
use tracing::{info, warn};

use crate::progress::CliProgress;

type Manager = SessionManager<HttpFetcherFactory>;

/// How often status is polled once the event stream is gone.
const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// fitscout: find which vehicle makes each catalog part fits.
#[derive(Parser)]
#[command(
    name = "fitscout",
    version,
    about = "Enrich automotive part catalogs with compatible vehicle makes.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Load a catalog and enrich a range of its automotive parts.
    Run {
        /// Categorized catalog JSON file.
        #[arg(short, long)]
        catalog: PathBuf,

        /// First automotive index to process (inclusive).
        #[arg(long, conflicts_with = "test")]
        start: Option<usize>,

        /// Index to stop at (exclusive). Defaults to the end of the list.
        #[arg(long, conflicts_with = "test")]
        end: Option<usize>,

        /// Process only the first test batch.
        #[arg(long)]
        test: bool,

        /// Write the export rows as JSON when the run ends.
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Resume a stopped or interrupted session from its checkpoint.
    Resume {
        /// Session ID (see `fitscout sessions list`).
        session_id: String,

        /// Write the export rows as JSON when the run ends.
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Stored session checkpoints.
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },

    /// Archive of completed and stopped sessions.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum SessionsAction {
    /// List checkpoints, newest first.
    List,
    /// Delete a checkpoint.
    Delete { session_id: String },
}

#[derive(Subcommand)]
pub(crate) enum HistoryAction {
    /// List archived sessions, newest first.
    List {
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Print one archived session as JSON.
    Show { id: String },
    /// Delete an archived session.
    Delete { id: String },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "fitscout=info",
        1 => "fitscout=debug",
        _ => "fitscout=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            catalog,
            start,
            end,
            test,
            export,
        } => cmd_run(&catalog, start, end, test, export.as_deref()).await,
        Command::Resume { session_id, export } => {
            cmd_resume(&session_id, export.as_deref()).await
        }
        Command::Sessions { action } => match action {
            SessionsAction::List => cmd_sessions_list().await,
            SessionsAction::Delete { session_id } => cmd_sessions_delete(&session_id).await,
        },
        Command::History { action } => match action {
            HistoryAction::List { limit } => cmd_history_list(limit).await,
            HistoryAction::Show { id } => cmd_history_show(&id).await,
            HistoryAction::Delete { id } => cmd_history_delete(&id).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Build a session manager over the configured database and lookup source.
async fn build_manager(config: &AppConfig, broadcaster: Option<&Broadcaster>) -> Result<Manager> {
    let db_path = config.db_path()?;
    let storage = Arc::new(Storage::open(&db_path).await?);
    info!(path = %db_path.display(), "storage opened");

    let lookup = LookupConfig::from(config);
    let extractor = MakeExtractor::from(&lookup);
    let factory = HttpFetcherFactory::new(lookup);

    let sink: Arc<dyn EventSink> = match broadcaster {
        Some(b) => Arc::new(b.clone()),
        None => Arc::new(SilentSink),
    };
    let manager =
        SessionManager::new(storage, factory, extractor, sink, SessionConfig::from(config)).await?;
    Ok(manager)
}

fn parse_session_id(raw: &str) -> Result<SessionId> {
    raw.trim()
        .parse::<SessionId>()
        .map_err(|e| eyre!("invalid session id '{raw}': {e}"))
}

fn parse_history_id(raw: &str) -> Result<HistoryId> {
    raw.trim()
        .parse::<HistoryId>()
        .map_err(|e| eyre!("invalid history id '{raw}': {e}"))
}

// ---------------------------------------------------------------------------
// run / resume
// ---------------------------------------------------------------------------

async fn cmd_run(
    catalog_path: &Path,
    start: Option<usize>,
    end: Option<usize>,
    test: bool,
    export: Option<&Path>,
) -> Result<()> {
    let config = load_config()?;

    let content = std::fs::read_to_string(catalog_path)
        .map_err(|e| eyre!("cannot read catalog '{}': {e}", catalog_path.display()))?;
    let catalog = Catalog::from_json(&content)?;

    let (broadcaster, _task) = Broadcaster::spawn(config.session.observer_buffer);
    let observer = broadcaster.subscribe();
    let manager = build_manager(&config, Some(&broadcaster)).await?;

    let counts = manager.load_catalog(catalog).await?;
    println!(
        "  Catalog: {} automotive, {} tools, {} unknown",
        counts.automotive, counts.tools, counts.unknown
    );

    let session_id = if test {
        manager.start_test_batch().await.map_err(explain)?
    } else {
        let start = start.unwrap_or(0);
        let end = end.unwrap_or(counts.automotive);
        manager.start(start, end).await.map_err(explain)?
    };
    println!("  Session: {session_id}");

    follow_session(&manager, observer).await;
    print_summary(&manager).await;
    if let Some(path) = export {
        write_export(&manager, path).await?;
    }
    Ok(())
}

async fn cmd_resume(raw_id: &str, export: Option<&Path>) -> Result<()> {
    let config = load_config()?;
    let session_id = parse_session_id(raw_id)?;

    let (broadcaster, _task) = Broadcaster::spawn(config.session.observer_buffer);
    let observer = broadcaster.subscribe();
    let manager = build_manager(&config, Some(&broadcaster)).await?;

    manager.resume(&session_id).await.map_err(explain)?;
    let status = manager.status().await;
    println!(
        "  Resuming {session_id} at {}/{}",
        status.processed_count,
        status.range_end - status.range_start
    );

    follow_session(&manager, observer).await;
    print_summary(&manager).await;
    if let Some(path) = export {
        write_export(&manager, path).await?;
    }
    Ok(())
}

/// Render events until the session ends. Ctrl-C requests a stop once.
async fn follow_session(manager: &Manager, observer: Observer) {
    watch_session(manager, observer, tokio::signal::ctrl_c()).await;
}

/// Follow the session through `observer`, falling back to status polling if
/// the broadcaster drops it. `stop_signal` resolving requests a stop.
async fn watch_session<S: Future>(manager: &Manager, mut observer: Observer, stop_signal: S) {
    let status = manager.status().await;
    let progress = CliProgress::new((status.range_end - status.range_start) as u64);

    tokio::pin!(stop_signal);
    let mut stop_requested = false;
    let mut streaming = true;
    let mut poll = tokio::time::interval(STATUS_POLL_INTERVAL);

    loop {
        tokio::select! {
            event = observer.receiver.recv(), if streaming => match event {
                Some(event) => {
                    progress.on_event(&event);
                    if event.is_terminal() {
                        break;
                    }
                }
                None => {
                    warn!("event stream closed, polling session status instead");
                    streaming = false;
                }
            },
            _ = poll.tick(), if !streaming => {
                let status = manager.status().await;
                progress.set_position(status.processed_count as u64);
                if !status.status.is_active() {
                    break;
                }
            }
            _ = &mut stop_signal, if !stop_requested => {
                stop_requested = true;
                progress.message("stopping after the current part...");
                manager.stop().await;
            }
        }
    }

    progress.finish();
    manager.wait().await;
}

/// Surface caller mistakes with a hint instead of a bare error chain.
fn explain(e: FitScoutError) -> Report {
    if !e.is_input_error() {
        return Report::new(e);
    }
    let hint = match &e {
        FitScoutError::InvalidRange { total, .. } => {
            format!("ranges must satisfy 0 <= start < end <= {total}")
        }
        FitScoutError::SessionNotFound(_) | FitScoutError::AlreadyCompleted(_) => {
            "list resumable sessions with `fitscout sessions list`".to_string()
        }
        FitScoutError::NoDataLoaded => "pass a catalog with --catalog".to_string(),
        _ => "wait for the current session to finish first".to_string(),
    };
    Report::new(e).suggestion(hint)
}

async fn print_summary(manager: &Manager) {
    let status = manager.status().await;
    println!();
    println!("  Status:     {}", status.status);
    if let Some(id) = status.session_id {
        println!("  Session:    {id}");
    }
    println!(
        "  Processed:  {} of [{}, {})",
        status.processed_count, status.range_start, status.range_end
    );
    println!(
        "  Found:      {} ({:.1}%)",
        status.successful_lookups,
        status.success_rate * 100.0
    );
    if let Some(err) = &status.error_message {
        println!("  Error:      {err}");
    }

    let leaderboard = manager.leaderboard(10).await;
    if !leaderboard.is_empty() {
        println!();
        println!("  {:<20} {:>8} {:>10}", "Make", "Parts", "Weighted");
        for entry in leaderboard {
            println!(
                "  {:<20} {:>8} {:>10}",
                entry.make, entry.occurrence_count, entry.weighted_count
            );
        }
    }
    println!();
}

async fn write_export(manager: &Manager, path: &Path) -> Result<()> {
    let rows = manager.export().await?;
    let json = serde_json::to_string_pretty(&rows)?;
    std::fs::write(path, json).map_err(|e| eyre!("cannot write '{}': {e}", path.display()))?;
    println!("  Exported {} rows to {}", rows.len(), path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// sessions / history
// ---------------------------------------------------------------------------

async fn cmd_sessions_list() -> Result<()> {
    let config = load_config()?;
    let manager = build_manager(&config, None).await?;
    let checkpoints = manager.checkpoints().await?;

    if checkpoints.is_empty() {
        println!("No saved sessions.");
        return Ok(());
    }
    for cp in checkpoints {
        println!(
            "{}  {:<14} {:>6}/{:<6} [{}, {})  {}",
            cp.session_id,
            cp.status.to_string(),
            cp.processed_count,
            cp.range_end - cp.range_start,
            cp.range_start,
            cp.range_end,
            cp.saved_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }
    Ok(())
}

async fn cmd_sessions_delete(raw_id: &str) -> Result<()> {
    let session_id = parse_session_id(raw_id)?;
    let config = load_config()?;
    let manager = build_manager(&config, None).await?;

    if manager.delete_checkpoint(&session_id).await? {
        println!("Deleted session {session_id}");
        Ok(())
    } else {
        Err(eyre!("no checkpoint for session {session_id}"))
    }
}

async fn cmd_history_list(limit: Option<usize>) -> Result<()> {
    let config = load_config()?;
    let manager = build_manager(&config, None).await?;
    let history = manager.history().await;
    let limit = limit.unwrap_or(history.len());

    if history.is_empty() {
        println!("No archived sessions.");
        return Ok(());
    }
    for entry in history.into_iter().take(limit) {
        let top: Vec<&str> = entry
            .summary
            .top_makes
            .iter()
            .map(|m| m.make.as_str())
            .collect();
        println!(
            "{}  {:<9} {:>6} parts  {:>5.1}%  {}  {}",
            entry.id,
            entry.outcome.to_string(),
            entry.summary.total_processed,
            entry.summary.success_rate * 100.0,
            entry.recorded_at.format("%Y-%m-%d %H:%M"),
            top.join(", "),
        );
    }
    Ok(())
}

async fn cmd_history_show(raw_id: &str) -> Result<()> {
    let id = parse_history_id(raw_id)?;
    let config = load_config()?;
    let manager = build_manager(&config, None).await?;

    let record = manager
        .history_record(&id)
        .await?
        .ok_or_else(|| eyre!("no history record {id}"))?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn cmd_history_delete(raw_id: &str) -> Result<()> {
    let id = parse_history_id(raw_id)?;
    let config = load_config()?;
    let manager = build_manager(&config, None).await?;

    if manager.delete_history(&id).await? {
        println!("Deleted history record {id}");
        Ok(())
    } else {
        Err(eyre!("no history record {id}"))
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
