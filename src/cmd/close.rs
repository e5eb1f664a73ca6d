//! Merge and cleanup commands.

use anyhow::Result;
use console::style;

use super::{Session, execute};
use tribunal::orchestrator::CleanupOptions;
use tribunal::ui::icons::{CHECK, CROSS};
use tribunal::util::short_sha;

pub async fn cmd_merge(session: &Session, delete_branch: bool) -> Result<u8> {
    session.require_initialized()?;
    let outcome = execute(session, "merge", true, move |wf| wf.merge(delete_branch)).await?;

    if !outcome.merged {
        eprintln!(
            "{}Merge refused: verdict is {}. Only a PASS verdict can be merged.",
            CROSS,
            style(outcome.verdict.to_string()).bold()
        );
        return Ok(outcome.exit_code());
    }
    println!(
        "{}Fast-forwarded {} to {}",
        CHECK,
        style(&outcome.target).bold(),
        short_sha(&outcome.head)
    );
    if outcome.branch_deleted {
        println!("  Review branch deleted");
    }
    Ok(0)
}

pub async fn cmd_cleanup(session: &Session, all: bool, prune_merged: bool, force: bool) -> Result<u8> {
    use dialoguer::Confirm;

    session.require_initialized()?;
    if !force {
        let what = if all { "every review run" } else { "the current review run" };
        let prompt = if prune_merged {
            format!("This removes the artifacts of {} and deletes merged review branches. Continue?", what)
        } else {
            format!("This removes the artifacts of {}. Continue?", what)
        };
        let confirm = Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .unwrap_or(false);
        if !confirm {
            println!("Cleanup cancelled");
            return Ok(0);
        }
    }

    let opts = CleanupOptions { all, prune_merged };
    let outcome = execute(session, "cleanup", true, move |wf| wf.cleanup(&opts)).await?;
    println!(
        "{}Removed {} run(s), {} artifact(s)",
        CHECK,
        outcome.removed_runs.len(),
        outcome.removed_artifacts
    );
    for branch in &outcome.pruned_branches {
        println!("  Deleted merged branch {}", branch);
    }
    Ok(0)
}
