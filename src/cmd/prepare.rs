//! Run setup: init, explore, plan and request generation.

use anyhow::Result;
use console::style;
use std::path::PathBuf;

use super::{Session, execute, print_warnings};
use tribunal::orchestrator::{ExploreKind, InitOptions};
use tribunal::plan::resolver::PlanStatus;
use tribunal::ui::icons::CHECK;
use tribunal::util::short_sha;

pub async fn cmd_init(session: &Session, base: String, target: Option<String>, force: bool) -> Result<u8> {
    session.config.ensure_directories()?;
    let opts = InitOptions { base, target, force };
    let run = execute(session, "init", true, move |wf| wf.init(&opts)).await?;

    println!();
    println!("{}Review run {}", CHECK, style(&run.id).bold());
    println!("  Review branch: {}", style(&run.branches.review).cyan());
    println!("  Base:          {} ({})", run.branches.base, short_sha(&run.base_commit));
    println!("  Target:        {} ({})", run.branches.target, short_sha(&run.target_commit));
    println!();
    println!("Next: tribunal explore context && tribunal explore diff");
    Ok(0)
}

pub async fn cmd_explore(session: &Session, kind: ExploreKind) -> Result<u8> {
    session.require_initialized()?;
    let outcome = execute(session, "explore", true, move |wf| wf.explore(kind)).await?;
    println!(
        "{}Wrote {} ({} files, +{} -{}, digest {})",
        CHECK,
        outcome.key,
        outcome.stat.files,
        outcome.stat.insertions,
        outcome.stat.deletions,
        style(&outcome.digest).dim()
    );
    Ok(0)
}

pub async fn cmd_plan(session: &Session, plan_path: Option<PathBuf>) -> Result<u8> {
    session.require_initialized()?;
    let outcome = execute(session, "plan", true, move |wf| wf.plan(plan_path.as_deref())).await?;
    let plan = &outcome.plan;

    println!();
    match plan.resolution.status {
        PlanStatus::Found => println!(
            "SSOT plan: {}",
            style(plan.resolution.path.as_deref().unwrap_or_default()).green()
        ),
        PlanStatus::Missing => println!("SSOT plan: {}", style("MISSING").yellow()),
        PlanStatus::Ambiguous => {
            println!("SSOT plan: {}", style("AMBIGUOUS").red());
            for c in &plan.resolution.candidates {
                println!("  {:>4}  {}", c.score, c.path);
            }
        }
    }
    println!();
    println!("{:<20} {:<12} {:<9} Rationale", "Participant", "Category", "Required");
    for p in &plan.participants {
        println!(
            "{:<20} {:<12} {:<9} {}",
            p.name,
            p.category.to_string(),
            if p.required { "yes" } else { "no" },
            style(&p.rationale).dim()
        );
    }
    println!();
    print_warnings(&outcome.warnings);
    Ok(0)
}

pub async fn cmd_run(session: &Session, override_drift: bool) -> Result<u8> {
    session.require_initialized()?;
    let outcome = execute(session, "run", true, move |wf| wf.run(override_drift)).await?;
    println!(
        "{}Wrote {} request(s); {} participant(s) pending. Drift: {}{}",
        CHECK,
        outcome.requests.len(),
        outcome.pending,
        outcome.drift,
        if outcome.override_used {
            style(" [override used]").yellow().to_string()
        } else {
            String::new()
        }
    );
    for key in &outcome.requests {
        println!("  .tribunal/{}", key);
    }
    Ok(0)
}
