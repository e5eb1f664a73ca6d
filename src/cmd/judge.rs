//! Verdict and handoff commands.

use anyhow::Result;
use console::style;

use super::{Session, execute};
use tribunal::review::verdict::Verdict;
use tribunal::ui::icons::{CHECK, CROSS, PENDING};

pub async fn cmd_verdict(session: &Session, allow_incomplete: bool, json: bool) -> Result<u8> {
    session.require_initialized()?;
    let verdict = execute(session, "verdict", true, move |wf| wf.verdict(allow_incomplete)).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
        return Ok(verdict.exit_code);
    }

    let (mark, label) = match verdict.verdict {
        Verdict::Pass => (CHECK, style("PASS").green()),
        Verdict::Fail => (CROSS, style("FAIL").red()),
        Verdict::Incomplete => (PENDING, style("INCOMPLETE").yellow()),
        Verdict::Invalid => (CROSS, style("INVALID").red()),
    };
    println!();
    println!("{}Verdict: {}", mark, label.bold());
    println!(
        "  Required {}: {} completed, {} invalid, {} missing; {} extra",
        verdict.stats.required,
        verdict.stats.completed,
        verdict.stats.invalid,
        verdict.stats.missing,
        verdict.stats.extras
    );
    println!("  Findings: {}", verdict.stats.counts);
    if !verdict.missing.is_empty() {
        println!("  Missing:  {}", verdict.missing.join(", "));
    }
    if !verdict.invalid.is_empty() {
        println!("  Invalid:  {}", verdict.invalid.join(", "));
    }
    if !verdict.corrupt.is_empty() {
        println!("  Corrupt:  {}", style(verdict.corrupt.join(", ")).yellow());
    }
    println!("  Drift:    {}", verdict.drift);
    if verdict.allow_incomplete {
        println!("  {}", style("(incomplete participation allowed)").dim());
    }
    println!();
    Ok(verdict.exit_code)
}

pub async fn cmd_handoff(session: &Session) -> Result<u8> {
    session.require_initialized()?;
    let (handoff, confirmation) = execute(session, "handoff", true, |wf| wf.handoff()).await?;

    println!();
    println!(
        "{}Handoff for {}: {} finding(s), {} raw / {} deduplicated patch candidate(s)",
        CHECK,
        style(&handoff.run_id).bold(),
        handoff.findings.len(),
        handoff.raw_patch_candidates.len(),
        handoff.deduplicated_patch_candidates.len()
    );
    for candidate in &handoff.deduplicated_patch_candidates {
        println!(
            "  {:<18} {} {} {}",
            candidate.id,
            candidate.priority,
            candidate.title,
            style(format!("[{}]", candidate.source_agents.join(", "))).dim()
        );
    }
    let pending = confirmation
        .decisions
        .iter()
        .filter(|d| d.user_decision == handoff.decision_rules.default)
        .count();
    println!();
    println!("{} decision(s) still {}; edit patch-confirmation.json to record them.", pending, handoff.decision_rules.default);
    Ok(0)
}
