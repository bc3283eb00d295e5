/*!
 * parasync - parallel replication orchestrator CLI
 *
 * Three subcommands: `run` drives one or more profiles to completion,
 * `resume` is the same but never discards an existing checkpoint, and
 * `status` reads and prints the health document of a running (or
 * recently finished) session.
 */

mod cli_style;

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use uuid::Uuid;

use parasync::config::{ChunkLimits, CopierOptions, MismatchSeverity, RunConfig, ScanMode, SyncProfile};
use parasync::error::Result;
use parasync::health::HealthReporter;
use parasync::orchestrator::{Orchestrator, Phase};

#[derive(Parser)]
#[command(name = "parasync", version, about = "Parallel replication orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Execute one or more profiles to completion.
    Run(RunArgs),
    /// Execute one or more profiles, never discarding an existing checkpoint.
    Resume(RunArgs),
    /// Read and print the health document of a run.
    Status {
        /// Directory the run wrote Robocurse-Health.json into (defaults to the system temp dir).
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Treat the document as stale if older than this many seconds (0 disables the check).
        #[arg(long, default_value_t = 60)]
        max_age_secs: u64,
    },
}

#[derive(Args)]
struct RunArgs {
    /// One profile: `name=NAME,source=PATH,destination=PATH[,snapshot]`. Repeatable.
    #[arg(long = "profile", required = true)]
    profiles: Vec<String>,

    /// Directory-tree split strategy shared across all profiles in this invocation.
    #[arg(long, value_enum, default_value = "smart")]
    scan_mode: ScanModeArg,

    #[arg(long, default_value_t = 4)]
    concurrency: usize,
    #[arg(long, default_value_t = 0)]
    bandwidth_limit_mbps: u64,
    #[arg(long)]
    preview: bool,
    #[arg(long)]
    verbose: bool,
    #[arg(long)]
    log_root: Option<PathBuf>,
    #[arg(long)]
    log_file: Option<PathBuf>,
    #[arg(long, default_value_t = 3)]
    max_chunk_retries: u32,
    #[arg(long, default_value_t = 5)]
    checkpoint_frequency: u64,
    #[arg(long, default_value_t = 10)]
    health_interval_secs: u64,
    #[arg(long, value_enum, default_value = "warning")]
    mismatch_severity: MismatchSeverityArg,

    #[arg(long, default_value_t = 10 * 1024 * 1024 * 1024)]
    max_chunk_size_bytes: u64,
    #[arg(long, default_value_t = 64 * 1024 * 1024)]
    min_chunk_size_bytes: u64,
    #[arg(long, default_value_t = 50_000)]
    max_chunk_files: u64,
    #[arg(long, default_value_t = 4)]
    max_chunk_depth: u32,

    /// Session id of the abandoned run to continue (required for `resume`
    /// to actually find its checkpoint, which lives under a session-scoped
    /// directory; print it with `status` while the run was still live).
    #[arg(long)]
    session_id: Option<Uuid>,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ScanModeArg {
    Smart,
    Flat,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum MismatchSeverityArg {
    Success,
    Warning,
    Error,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        CliCommand::Run(args) => {
            parasync::logging::init_logging(args.verbose, args.log_file.as_deref())?;
            run(args, false)?;
        }
        CliCommand::Resume(args) => {
            parasync::logging::init_logging(args.verbose, args.log_file.as_deref())?;
            if args.session_id.is_none() {
                eprintln!(
                    "{} resuming without --session-id starts a fresh session and will not find the prior checkpoint",
                    cli_style::Theme::warning("warning:")
                );
            }
            run(args, true)?;
        }
        CliCommand::Status { dir, max_age_secs } => {
            status(dir, max_age_secs)?;
        }
    }

    Ok(())
}

fn run(args: RunArgs, resuming: bool) -> Result<()> {
    let profiles = args
        .profiles
        .iter()
        .map(|raw| parse_profile(raw, &args))
        .collect::<Result<Vec<_>>>()?;

    let config = RunConfig {
        profiles,
        max_concurrent: args.concurrency,
        bandwidth_limit_mbps: args.bandwidth_limit_mbps,
        preview: args.preview,
        verbose: args.verbose,
        ignore_checkpoint: !resuming,
        log_root: args.log_root.unwrap_or_else(|| PathBuf::from(".")),
        default_mismatch_severity: match args.mismatch_severity {
            MismatchSeverityArg::Success => MismatchSeverity::Success,
            MismatchSeverityArg::Warning => MismatchSeverity::Warning,
            MismatchSeverityArg::Error => MismatchSeverity::Error,
        },
        max_chunk_retries: args.max_chunk_retries,
        checkpoint_frequency: args.checkpoint_frequency,
        health_interval_secs: args.health_interval_secs,
        ..RunConfig::default()
    };

    let orchestrator = match (resuming, args.session_id) {
        (true, Some(session_id)) => Orchestrator::with_session_id(config.clone(), session_id),
        _ => Orchestrator::new(config.clone()),
    };
    orchestrator.start_run()?;

    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );

    loop {
        orchestrator.tick(config.max_concurrent)?;
        let snapshot = orchestrator.snapshot();
        bar.set_message(format!(
            "{} profile {}/{} — {}/{} chunks, {} failed, {} active",
            snapshot.phase.as_str(),
            snapshot.profile_index + 1,
            snapshot.profile_count.max(1),
            snapshot.chunks_completed,
            snapshot.chunks_total,
            snapshot.chunks_failed,
            snapshot.active_jobs,
        ));
        bar.tick();

        if matches!(snapshot.phase, Phase::Complete | Phase::Stopped) {
            break;
        }
        thread::sleep(Duration::from_millis(500));
    }
    bar.finish_and_clear();

    print_summary(&orchestrator);
    Ok(())
}

fn parse_profile(raw: &str, args: &RunArgs) -> Result<SyncProfile> {
    use parasync::error::OrchestratorError;

    let mut name = None;
    let mut source = None;
    let mut destination = None;
    let mut snapshot_requested = false;

    for field in raw.split(',') {
        let field = field.trim();
        if field.eq_ignore_ascii_case("snapshot") {
            snapshot_requested = true;
            continue;
        }
        let Some((key, value)) = field.split_once('=') else {
            return Err(OrchestratorError::Configuration(format!(
                "malformed profile field '{}': expected key=value",
                field
            )));
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "name" => name = Some(value.trim().to_string()),
            "source" => source = Some(PathBuf::from(value.trim())),
            "destination" | "dest" => destination = Some(PathBuf::from(value.trim())),
            other => {
                return Err(OrchestratorError::Configuration(format!(
                    "unknown profile field '{}'",
                    other
                )))
            }
        }
    }

    let source = source.ok_or_else(|| OrchestratorError::Configuration("profile missing 'source'".into()))?;
    let destination =
        destination.ok_or_else(|| OrchestratorError::Configuration("profile missing 'destination'".into()))?;
    let name = name.unwrap_or_else(|| {
        source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "profile".to_string())
    });

    let mut profile = SyncProfile::new(name, source, destination);
    profile.snapshot_requested = snapshot_requested;
    profile.scan_mode = match args.scan_mode {
        ScanModeArg::Smart => ScanMode::Smart,
        ScanModeArg::Flat => ScanMode::Flat,
    };
    profile.chunk_limits = ChunkLimits {
        max_size_bytes: args.max_chunk_size_bytes,
        max_files: args.max_chunk_files,
        max_depth: args.max_chunk_depth,
        min_size_bytes: args.min_chunk_size_bytes,
    };
    profile.chunk_limits.validate().map_err(OrchestratorError::Configuration)?;
    profile.copier_options = CopierOptions::default();

    Ok(profile)
}

fn print_summary(orchestrator: &Orchestrator) {
    let results = orchestrator.profile_results();

    for result in &results {
        for message in result.error_messages.iter().take(5) {
            println!("{} {}: {}", cli_style::Theme::warning("warning"), result.profile_name, message);
        }
    }

    println!("{}", cli_style::profile_summary_table(&results));
}

fn status(dir: Option<PathBuf>, max_age_secs: u64) -> Result<()> {
    let dir = dir.unwrap_or_else(std::env::temp_dir);
    let reporter = HealthReporter::new(&dir, 0);
    let status = reporter.read_status(max_age_secs)?;

    let health_label = if status.healthy {
        style("healthy").green()
    } else {
        style("unhealthy").red()
    };

    println!(
        "session {} — {} [{}]",
        status.session_id,
        status.phase,
        health_label
    );
    println!(
        "profile {}/{}: {} chunks complete of {} ({} pending, {} failed)",
        status.profile_index + 1,
        status.profile_count.max(1),
        status.chunks_completed,
        status.chunks_total,
        status.chunks_pending,
        status.chunks_failed,
    );
    println!("active jobs: {}, bytes completed: {}", status.active_jobs, status.bytes_completed);
    if status.is_stale {
        println!("{}", style("warning: health document is stale").yellow());
    }

    Ok(())
}
