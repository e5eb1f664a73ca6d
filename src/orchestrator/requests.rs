//! Request documents handed to external reviewers.

use std::fmt::Write as _;

use crate::config::STATE_DIR;
use crate::layout;
use crate::plan::{PlanDocument, PlannedParticipant};
use crate::review::MAX_REPORT_LINES;
use crate::review::participants::Category;

use super::state::Run;

/// Render the request for one planned participant.
pub fn render_request(run: &Run, plan: &PlanDocument, participant: &PlannedParticipant) -> String {
    let mut md = String::new();
    let state_path = |key: String| format!("{}/{}", STATE_DIR, key);

    let _ = writeln!(md, "# Review Request: {}\n", participant.name);
    let _ = writeln!(md, "- Participant: `{}`", participant.name);
    let _ = writeln!(md, "- Category: {}", participant.category);
    let _ = writeln!(
        md,
        "- Requirement: {}",
        if participant.required { "required" } else { "optional" }
    );
    if !participant.rationale.is_empty() {
        let _ = writeln!(md, "- Rationale: {}", participant.rationale);
    }
    let _ = writeln!(md, "- Timeout: {}s (metadata only)", plan.timeout_secs);

    let _ = writeln!(md, "\n## Run\n");
    let _ = writeln!(md, "- Run id: `{}`", run.id);
    let _ = writeln!(md, "- Review branch: `{}`", run.branches.review);
    let _ = writeln!(
        md,
        "- Base: `{}` ({})",
        run.branches.base,
        crate::util::short_sha(&run.base_commit)
    );
    let _ = writeln!(
        md,
        "- Target: `{}` ({})",
        run.branches.target,
        crate::util::short_sha(&run.target_commit)
    );

    let _ = writeln!(md, "\n## Inputs\n");
    let _ = writeln!(md, "- Context: `{}`", state_path(layout::context_key(&run.id)));
    let _ = writeln!(md, "- Diff: `{}`", state_path(layout::diff_key(&run.id)));
    match plan.resolution.path {
        Some(ref path) => {
            let _ = writeln!(md, "- SSOT plan: `{}`", path);
        }
        None => {
            let _ = writeln!(md, "- SSOT plan: none ({})", plan.resolution.status);
        }
    }
    let _ = writeln!(md, "- Review plan: `{}`", state_path(layout::plan_doc_key(&run.id)));

    let _ = writeln!(md, "\n## Submission\n");
    match participant.category {
        Category::Agent => {
            let _ = writeln!(md, "```sh\ntribunal ingest {} --file <report.md>\n```", participant.name);
            md.push_str(&report_contract());
        }
        Category::StaticTool => {
            let _ = writeln!(
                md,
                "Run `{}` over the changed files and submit its raw output together with the process exit code:\n",
                participant.name
            );
            let _ = writeln!(
                md,
                "```sh\n{name} ... > {name}.txt; tribunal ingest {name} --file {name}.txt --exit-code $?\n```",
                name = participant.name
            );
        }
    }
    md
}

fn report_contract() -> String {
    let mut md = String::new();
    let _ = writeln!(md, "\n## Report Contract\n");
    let _ = writeln!(md, "- At most {} lines.", MAX_REPORT_LINES);
    let _ = writeln!(md, "- Required sections: `## Summary`, `## Verdict`.");
    let _ = writeln!(
        md,
        "- Findings go under `## P0 Findings`, `## P1 Findings`, `## P2 Findings`; \
         write \"No findings\" when there are none."
    );
    let _ = writeln!(md, "- Finding headings: `### P1-1: Short title`.");
    let _ = writeln!(
        md,
        "- Each finding needs evidence: a `file:line` reference, a `Location:`/`Evidence:`/`File:` line, or a fenced code block."
    );
    let _ = writeln!(md, "- Recommended: `## Statistics` table, `## Test Plan`, `## Confidence`.\n");
    let _ = writeln!(md, "```markdown");
    let _ = writeln!(md, "## Summary\n<one paragraph>\n");
    let _ = writeln!(md, "## P1 Findings\n\n### P1-1: <title>\nLocation: src/file.rs:10\n<description>\n");
    let _ = writeln!(md, "## Statistics\n\n| Priority | Count |\n|---|---|\n| P0 | 0 |\n| P1 | 1 |\n| P2 | 0 |\n");
    let _ = writeln!(md, "## Verdict\nPASS");
    let _ = writeln!(md, "```");
    md
}
