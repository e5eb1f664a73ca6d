//! Ingest command: accept a report or tool output.

use anyhow::{Context, Result};
use console::style;
use std::io::Read;
use std::path::PathBuf;

use super::{Session, execute, wrapped};
use tribunal::errors::ReviewError;
use tribunal::orchestrator::IngestOptions;
use tribunal::review::participants::ParticipantState;
use tribunal::ui::icons::{CHECK, CROSS, WARN};

pub struct IngestArgs {
    pub participant: String,
    pub file: Option<PathBuf>,
    pub extra: bool,
    pub overwrite: bool,
    pub tool: bool,
    pub exit_code: Option<i32>,
}

pub async fn cmd_ingest(session: &Session, args: IngestArgs) -> Result<u8> {
    session.require_initialized()?;
    let content = match args.file {
        Some(ref path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read submission from stdin")?;
            buf
        }
    };

    let opts = IngestOptions {
        participant: args.participant,
        content,
        extra: args.extra,
        overwrite: args.overwrite,
        static_tool: args.tool,
        exit_code: args.exit_code,
    };
    let outcome = execute(session, "ingest", true, move |wf| wf.ingest(&opts)).await?;
    let status = &outcome.status;

    let mark = match status.state {
        ParticipantState::Invalid | ParticipantState::Unknown | ParticipantState::Fail => CROSS,
        _ => CHECK,
    };
    println!(
        "{}{} ({}{}) -> {}{}",
        mark,
        style(&status.name).bold(),
        status.category,
        if status.is_extra { ", extra" } else { "" },
        style(status.state.to_string()).bold(),
        if outcome.replaced { " (replaced previous submission)" } else { "" }
    );
    if let Some(ref tool) = status.tool {
        println!("{}", wrapped(&format!("{} ({} issues)", tool.reason, tool.issues), "  "));
    }
    if let Some(ref result) = outcome.validation {
        if !result.valid {
            let violation = ReviewError::ContractViolation {
                participant: status.name.clone(),
                errors: result.errors.clone(),
            };
            eprintln!("{}", wrapped(&violation.to_string(), "  "));
        }
        for warning in &result.warnings {
            eprintln!("{}{}", WARN, wrapped(warning, "").trim_start());
        }
        println!("  Findings: {} ({} lines)", result.counts, result.line_count);
    }
    // Rejected content is still recorded; the exit code stays 0.
    Ok(0)
}
