//! Status command.

use anyhow::Result;
use console::style;

use super::{Session, execute, wrapped};
use tribunal::orchestrator::StatusSnapshot;
use tribunal::ui::icons::WARN;

pub async fn cmd_status(session: &Session, json: bool) -> Result<u8> {
    session.require_initialized()?;
    let snapshot = execute(session, "status", false, |wf| wf.status()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(0);
    }
    print_snapshot(&snapshot);
    Ok(0)
}

fn print_snapshot(snapshot: &StatusSnapshot) {
    let run = &snapshot.run;
    println!();
    println!("Review Run {}", style(&run.id).bold());
    println!("==========={}", "=".repeat(run.id.len() + 1));
    println!("Branches:  {} (base {}, target {})", run.branches.review, run.branches.base, run.branches.target);
    println!("Status:    {}", style(run.status.to_string()).cyan());
    match (&run.plan_status, &run.plan_path) {
        (Some(status), Some(path)) => println!("Plan:      {} ({})", status, path),
        (Some(status), None) => println!("Plan:      {}", status),
        _ => println!("Plan:      not planned"),
    }
    println!("Drift:     {}", run.drift.summary());
    println!("Warnings:  {}", run.warning_count);
    if let Some(verdict) = run.verdict {
        println!("Verdict:   {}", style(verdict.to_string()).bold());
    }
    if let Some(merged_at) = run.merged_at {
        println!("Merged:    {}", merged_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(ref failure) = run.failure {
        println!("Failure:   {}", style(failure).red());
    }

    if snapshot.participants.is_empty() {
        println!();
        println!("No participants yet. Run 'tribunal plan' and 'tribunal run'.");
        println!();
        return;
    }

    println!();
    println!(
        "{:<20} {:<12} {:<9} {:<9} {:<10} Updated",
        "Participant", "Category", "Required", "State", "Valid"
    );
    println!(
        "{:<20} {:<12} {:<9} {:<9} {:<10} -------",
        "-".repeat(20),
        "-".repeat(12),
        "-".repeat(9),
        "-".repeat(9),
        "-".repeat(10)
    );
    for row in &snapshot.participants {
        let required = match (row.is_extra, row.required) {
            (true, _) => "extra",
            (false, Some(true)) => "yes",
            (false, _) => "no",
        };
        let valid = match row.valid {
            Some(true) if row.warnings > 0 => format!("yes ({}w)", row.warnings),
            Some(true) => "yes".to_string(),
            Some(false) => format!("no ({}e)", row.errors),
            None => "-".to_string(),
        };
        println!(
            "{:<20} {:<12} {:<9} {:<9} {:<10} {}",
            row.name,
            row.category.map_or("-".to_string(), |c| c.to_string()),
            required,
            row.state,
            valid,
            row.updated_at
                .map_or("-".to_string(), |t| t.format("%H:%M:%S").to_string())
        );
        if let Some(ref detail) = row.detail
            && !detail.is_empty()
        {
            println!("{}", style(wrapped(detail, "    ")).dim());
        }
    }
    for corrupt in &snapshot.corrupt {
        eprintln!("{}corrupt status record counted as missing: {}", WARN, corrupt);
    }
    println!();
}
