use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use tribunal::config::Config;
use tribunal::errors::exit_code_for;
use tribunal::orchestrator::ExploreKind;

mod cmd;

#[derive(Parser)]
#[command(name = "tribunal")]
#[command(version, about = "Multi-participant code review orchestrator")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Show a live participant status line while the step runs
    #[arg(long, global = true)]
    pub progress: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a review run and create its review branch
    Init {
        /// Branch the target is reviewed against
        #[arg(long)]
        base: String,
        /// Branch under review (defaults to the checked-out branch)
        #[arg(long)]
        target: Option<String>,
        /// Replace the current run and reset an existing review branch
        #[arg(long)]
        force: bool,
    },
    /// Write the context or diff artifact of the current run
    Explore {
        #[arg(value_enum)]
        artifact: ExploreArtifact,
    },
    /// Resolve the SSOT plan and fix the participants
    Plan {
        /// Use this plan file instead of resolving one
        #[arg(long)]
        plan_path: Option<PathBuf>,
    },
    /// Check drift and write one request per participant
    Run {
        /// Proceed despite drift; recorded on the run permanently
        #[arg(long)]
        override_drift: bool,
    },
    /// Submit a report (agents) or raw output (static tools)
    Ingest {
        participant: String,
        /// Read the submission from this file instead of stdin
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Submit for a participant outside the plan
        #[arg(long)]
        extra: bool,
        /// Replace an earlier submission
        #[arg(long)]
        overwrite: bool,
        /// Treat an extra submission as static-tool output
        #[arg(long)]
        tool: bool,
        /// Exit code of the tool process
        #[arg(long, allow_hyphen_values = true)]
        exit_code: Option<i32>,
    },
    /// Show the current run and its participants
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Aggregate submissions into PASS / FAIL / INCOMPLETE / INVALID
    Verdict {
        /// Judge what was submitted even if participants are missing or invalid
        #[arg(long)]
        allow_incomplete: bool,
        #[arg(long)]
        json: bool,
    },
    /// Build patch candidates from the agents' findings
    Handoff,
    /// Fast-forward the target branch after a PASS verdict
    Merge {
        #[arg(long)]
        delete_branch: bool,
    },
    /// Remove run artifacts
    Cleanup {
        /// Remove every run, not only the current one
        #[arg(long)]
        all: bool,
        /// Delete review branches already merged into their base
        #[arg(long)]
        prune_merged: bool,
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ExploreArtifact {
    Context,
    Diff,
}

impl From<ExploreArtifact> for ExploreKind {
    fn from(artifact: ExploreArtifact) -> Self {
        match artifact {
            ExploreArtifact::Context => ExploreKind::Context,
            ExploreArtifact::Diff => ExploreKind::Diff,
        }
    }
}

/// Stderr logging filtered by `TRIBUNAL_LOG`, plus a file log once the
/// state directory has a `logs/` folder.
fn init_tracing(verbose: bool, log_dir: Option<PathBuf>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let default = if verbose { "info" } else { "warn" };
    let filter = std::env::var("TRIBUNAL_LOG")
        .ok()
        .and_then(|spec| EnvFilter::try_new(spec).ok())
        .unwrap_or_else(|| EnvFilter::new(default));
    let stderr = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    match log_dir.filter(|dir| dir.is_dir()) {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, "tribunal.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(file)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let project_dir = cli
        .project_dir
        .clone()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    let _log_guard = init_tracing(
        cli.verbose,
        Some(project_dir.join(tribunal::config::STATE_DIR).join("logs")),
    );

    match run(cli, project_dir).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("{} {:#}", console::style("Error:").red().bold(), err);
            ExitCode::from(exit_code_for(&err))
        }
    }
}

async fn run(cli: Cli, project_dir: PathBuf) -> Result<u8> {
    let config = Config::load(project_dir, cli.verbose).context("Failed to load configuration")?;
    let session = cmd::Session {
        config,
        progress: cli.progress,
    };

    match cli.command {
        Commands::Init { base, target, force } => cmd::cmd_init(&session, base, target, force).await,
        Commands::Explore { artifact } => cmd::cmd_explore(&session, artifact.into()).await,
        Commands::Plan { plan_path } => cmd::cmd_plan(&session, plan_path).await,
        Commands::Run { override_drift } => cmd::cmd_run(&session, override_drift).await,
        Commands::Ingest {
            participant,
            file,
            extra,
            overwrite,
            tool,
            exit_code,
        } => {
            let args = cmd::ingest::IngestArgs {
                participant,
                file,
                extra,
                overwrite,
                tool,
                exit_code,
            };
            cmd::cmd_ingest(&session, args).await
        }
        Commands::Status { json } => cmd::cmd_status(&session, json).await,
        Commands::Verdict {
            allow_incomplete,
            json,
        } => cmd::cmd_verdict(&session, allow_incomplete, json).await,
        Commands::Handoff => cmd::cmd_handoff(&session).await,
        Commands::Merge { delete_branch } => cmd::cmd_merge(&session, delete_branch).await,
        Commands::Cleanup {
            all,
            prune_merged,
            force,
        } => cmd::cmd_cleanup(&session, all, prune_merged, force).await,
    }
}
