//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module     | Commands handled                    |
//! |------------|-------------------------------------|
//! | `prepare`  | `Init`, `Explore`, `Plan`, `Run`    |
//! | `ingest`   | `Ingest`                            |
//! | `status`   | `Status`                            |
//! | `judge`    | `Verdict`, `Handoff`                |
//! | `close`    | `Merge`, `Cleanup`                  |
//!
//! Commands return the process exit code; errors are mapped in `main`.

pub mod close;
pub mod ingest;
pub mod judge;
pub mod prepare;
pub mod status;

pub use close::{cmd_cleanup, cmd_merge};
pub use ingest::cmd_ingest;
pub use judge::{cmd_handoff, cmd_verdict};
pub use prepare::{cmd_explore, cmd_init, cmd_plan, cmd_run};
pub use status::cmd_status;

use anyhow::{Context, Result};
use console::style;

use tribunal::config::Config;
use tribunal::errors::ReviewError;
use tribunal::orchestrator::{CancelFlag, Workflow};
use tribunal::store::{FsStore, StateLock};
use tribunal::ui::StatusReporter;
use tribunal::ui::icons::WARN;
use tribunal::vcs::GitVcs;

/// Per-invocation settings shared by every command.
pub struct Session {
    pub config: Config,
    pub progress: bool,
}

impl Session {
    pub fn require_initialized(&self) -> Result<()> {
        if !self.config.is_initialized() {
            return Err(ReviewError::precondition(format!(
                "No review state in {}. Run 'tribunal init' first",
                self.config.project_dir.display()
            ))
            .into());
        }
        Ok(())
    }
}

/// Run one workflow step on a blocking thread.
///
/// Mutating steps hold the state lock for their whole duration. Ctrl-C
/// only raises the cancel flag; the step stops at its next checkpoint.
/// With `--progress` a status reporter polls the artifacts meanwhile.
pub async fn execute<T, F>(session: &Session, step: &'static str, mutating: bool, f: F) -> Result<T>
where
    F: FnOnce(&Workflow<'_>) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let _lock = if mutating {
        Some(StateLock::acquire(&session.config.state_dir)?)
    } else {
        None
    };
    let cancel = CancelFlag::new();
    let reporter = session
        .progress
        .then(|| StatusReporter::spawn(session.config.state_dir.clone(), step));

    let config = session.config.clone();
    let worker_cancel = cancel.clone();
    let mut handle = tokio::task::spawn_blocking(move || {
        let store = FsStore::new(config.state_dir.clone());
        let vcs = GitVcs::open(&config.project_dir)?;
        let workflow = Workflow::new(&config, &store, &vcs, worker_cancel);
        f(&workflow)
    });

    let joined = tokio::select! {
        joined = &mut handle => joined,
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            tracing::warn!(step, "interrupt received; stopping at the next checkpoint");
            handle.await
        }
    };
    let result = joined.with_context(|| format!("'{}' worker panicked", step))?;
    if let Some(reporter) = reporter {
        reporter.finish(result.is_ok());
    }
    result
}

pub fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        eprintln!("{}{}", WARN, style(warning).yellow());
    }
}

/// Wrap `text` to the terminal width with a hanging indent.
pub fn wrapped(text: &str, indent: &str) -> String {
    let width = terminal_size::terminal_size()
        .map(|(w, _)| w.0 as usize)
        .unwrap_or(100)
        .max(40);
    let options = textwrap::Options::new(width)
        .initial_indent(indent)
        .subsequent_indent(indent);
    textwrap::fill(text, &options)
}
