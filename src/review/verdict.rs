//! Final verdict aggregation.
//!
//! Every required participant lands in exactly one bucket: completed,
//! invalid or missing. All participants are scanned before deciding, so the
//! verdict lists every problem at once.
//!
//! | Condition | Verdict | Exit |
//! |---|---|---|
//! | any required invalid (unless `allow_incomplete`) | INVALID | 2 |
//! | any required missing (unless `allow_incomplete`) | INCOMPLETE | 2 |
//! | aggregate P0 > 0 | FAIL | 1 |
//! | otherwise | PASS | 0 |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fmt::Write as _;

use super::findings::{Priority, PriorityCounts};
use super::participants::{Category, ParticipantState, StatusRecord};
use crate::errors::{EXIT_BLOCKED, EXIT_FAILURE};
use crate::plan::PlannedParticipant;

pub const VERDICT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Pass,
    Fail,
    Incomplete,
    Invalid,
}

impl Verdict {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Pass => 0,
            Self::Fail => EXIT_FAILURE,
            Self::Incomplete | Self::Invalid => EXIT_BLOCKED,
        }
    }

    /// PASS and FAIL are final; the others wait for more submissions.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Pass | Self::Fail)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Incomplete => "INCOMPLETE",
            Self::Invalid => "INVALID",
        };
        write!(f, "{}", s)
    }
}

/// Completion bucket of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    Completed,
    Invalid,
    Missing,
}

/// Per-participant line of the breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantOutcome {
    pub name: String,
    pub category: Category,
    pub required: bool,
    pub is_extra: bool,
    /// State label, including CORRUPT and MISSING.
    pub state: String,
    pub completion: Completion,
    /// Contribution to the aggregate counts.
    pub counts: PriorityCounts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictStats {
    pub required: usize,
    pub completed: usize,
    pub invalid: usize,
    pub missing: usize,
    pub extras: usize,
    pub counts: PriorityCounts,
}

/// Paths of the artifacts the verdict was computed from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    #[serde(default)]
    pub reports: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalVerdict {
    pub schema_version: u32,
    pub run_id: String,
    pub verdict: Verdict,
    pub exit_code: u8,
    pub allow_incomplete: bool,
    pub stats: VerdictStats,
    pub participants: Vec<ParticipantOutcome>,
    #[serde(default)]
    pub missing: Vec<String>,
    #[serde(default)]
    pub invalid: Vec<String>,
    /// Status records that failed validation; also listed as missing.
    #[serde(default)]
    pub corrupt: Vec<String>,
    #[serde(default)]
    pub drift: String,
    #[serde(default)]
    pub artifacts: ArtifactRefs,
    pub generated_at: DateTime<Utc>,
}

/// Aggregate statuses into a verdict.
///
/// `planned` is the required/optional roster; `statuses` every status record
/// read for the run. Records for names outside `planned` are extras.
pub fn aggregate(
    run_id: &str,
    planned: &[PlannedParticipant],
    statuses: &[(String, StatusRecord)],
    allow_incomplete: bool,
) -> FinalVerdict {
    let mut stats = VerdictStats::default();
    let mut outcomes = Vec::new();
    let mut missing = Vec::new();
    let mut invalid = Vec::new();
    let mut corrupt = Vec::new();

    let absent = StatusRecord::Missing;
    let lookup = |name: &str| statuses.iter().find(|(n, _)| n == name).map(|(_, r)| r);

    for p in planned {
        let record = lookup(&p.name).unwrap_or(&absent);
        let outcome = outcome_for(&p.name, p.category, p.required, false, record);
        if let StatusRecord::Corrupt { .. } = record {
            corrupt.push(p.name.clone());
        }
        if p.required {
            stats.required += 1;
            match outcome.completion {
                Completion::Completed => stats.completed += 1,
                Completion::Invalid => {
                    stats.invalid += 1;
                    invalid.push(p.name.clone());
                }
                Completion::Missing => {
                    stats.missing += 1;
                    missing.push(p.name.clone());
                }
            }
        }
        stats.counts.merge(&outcome.counts);
        outcomes.push(outcome);
    }

    let planned_names: HashSet<&str> = planned.iter().map(|p| p.name.as_str()).collect();
    for (name, record) in statuses {
        if planned_names.contains(name.as_str()) {
            continue;
        }
        let category = record.status().map_or(Category::Agent, |s| s.category);
        let outcome = outcome_for(name, category, false, true, record);
        if let StatusRecord::Corrupt { .. } = record {
            corrupt.push(name.clone());
        }
        stats.extras += 1;
        stats.counts.merge(&outcome.counts);
        outcomes.push(outcome);
    }

    let verdict = if !invalid.is_empty() && !allow_incomplete {
        Verdict::Invalid
    } else if !missing.is_empty() && !allow_incomplete {
        Verdict::Incomplete
    } else if stats.counts.p0 > 0 {
        Verdict::Fail
    } else {
        Verdict::Pass
    };

    FinalVerdict {
        schema_version: VERDICT_SCHEMA_VERSION,
        run_id: run_id.to_string(),
        exit_code: verdict.exit_code(),
        verdict,
        allow_incomplete,
        stats,
        participants: outcomes,
        missing,
        invalid,
        corrupt,
        drift: String::new(),
        artifacts: ArtifactRefs::default(),
        generated_at: Utc::now(),
    }
}

fn outcome_for(
    name: &str,
    category: Category,
    required: bool,
    is_extra: bool,
    record: &StatusRecord,
) -> ParticipantOutcome {
    let mut counts = PriorityCounts::default();
    let mut note = None;

    let completion = match record {
        StatusRecord::Missing => Completion::Missing,
        StatusRecord::Corrupt { reason } => {
            note = Some(format!("corrupt status: {}", reason));
            Completion::Missing
        }
        StatusRecord::Present(status) if status.is_complete() => {
            match status.category {
                Category::Agent => {
                    if let Some(ref v) = status.validation {
                        counts = v.counts;
                    }
                }
                Category::StaticTool => {
                    if status.state == ParticipantState::Fail {
                        let issues = status.tool.as_ref().map_or(1, |t| t.issues.max(1));
                        // A failing gate tool blocks; an advisory one does not.
                        let tier = if required { Priority::P0 } else { Priority::P1 };
                        counts.add(tier, issues);
                    }
                    note = status.tool.as_ref().map(|t| t.reason.clone());
                }
            }
            Completion::Completed
        }
        StatusRecord::Present(status) if status.is_invalid() => {
            note = status
                .validation
                .as_ref()
                .filter(|v| !v.errors.is_empty())
                .map(|v| v.errors.join("; "))
                .or_else(|| status.tool.as_ref().map(|t| t.reason.clone()));
            Completion::Invalid
        }
        StatusRecord::Present(_) => Completion::Missing,
    };

    ParticipantOutcome {
        name: name.to_string(),
        category,
        required,
        is_extra,
        state: record.label(),
        completion,
        counts,
        note,
    }
}

impl FinalVerdict {
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        let _ = writeln!(md, "# Verdict: {}\n", self.verdict);
        let _ = writeln!(md, "- Run: {}", self.run_id);
        let _ = writeln!(md, "- Generated: {}", self.generated_at.to_rfc3339());
        let _ = writeln!(md, "- Exit code: {}", self.exit_code);
        if self.allow_incomplete {
            let _ = writeln!(md, "- Incomplete participants allowed");
        }
        if !self.drift.is_empty() {
            let _ = writeln!(md, "- Drift: {}", self.drift);
        }

        let _ = writeln!(md, "\n## Statistics\n");
        let _ = writeln!(md, "| Priority | Count |");
        let _ = writeln!(md, "|---|---|");
        for p in Priority::ALL {
            let _ = writeln!(md, "| {} | {} |", p, self.stats.counts.get(p));
        }
        let _ = writeln!(
            md,
            "\nRequired: {} (completed {}, invalid {}, missing {}), extras: {}",
            self.stats.required,
            self.stats.completed,
            self.stats.invalid,
            self.stats.missing,
            self.stats.extras
        );

        let _ = writeln!(md, "\n## Participants\n");
        let _ = writeln!(md, "| Participant | Category | Required | State | Counts | Note |");
        let _ = writeln!(md, "|---|---|---|---|---|---|");
        for o in &self.participants {
            let required = if o.is_extra {
                "extra"
            } else if o.required {
                "yes"
            } else {
                "no"
            };
            let _ = writeln!(
                md,
                "| {} | {} | {} | {} | {} | {} |",
                o.name,
                o.category,
                required,
                o.state,
                o.counts,
                o.note.as_deref().unwrap_or("")
            );
        }

        if !self.missing.is_empty() {
            let _ = writeln!(md, "\nMissing: {}", self.missing.join(", "));
        }
        if !self.invalid.is_empty() {
            let _ = writeln!(md, "Invalid: {}", self.invalid.join(", "));
        }
        if !self.corrupt.is_empty() {
            let _ = writeln!(md, "Corrupt status records: {}", self.corrupt.join(", "));
        }
        md
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ToolStatus, ToolSummary};
    use crate::review::contract::validate_report;
    use crate::review::participants::ParticipantStatus;

    fn planned(name: &str, category: Category, required: bool) -> PlannedParticipant {
        PlannedParticipant {
            name: name.to_string(),
            category,
            required,
            rationale: String::new(),
        }
    }

    fn done_agent(name: &str, report: &str) -> (String, StatusRecord) {
        let mut s = ParticipantStatus::pending(name, Category::Agent);
        s.record_report("h".into(), &validate_report(report));
        (name.to_string(), StatusRecord::Present(s))
    }

    fn tool(name: &str, summary: ToolSummary) -> (String, StatusRecord) {
        let mut s = ParticipantStatus::pending(name, Category::StaticTool);
        s.record_tool_output("h".into(), summary);
        (name.to_string(), StatusRecord::Present(s))
    }

    fn report(p0: u32) -> String {
        format!(
            "## Summary\nx\n## Statistics\n| Priority | Count |\n|---|---|\n| P0 | {} |\n| P1 | 0 |\n| P2 | 1 |\n## Test Plan\nx\n## Confidence\nx\n## Verdict\nx\n",
            p0
        )
    }

    #[test]
    fn test_missing_required_is_incomplete() {
        let plan = vec![planned("A", Category::Agent, true), planned("B", Category::Agent, true)];
        let statuses = vec![done_agent("A", &report(0))];
        let v = aggregate("r", &plan, &statuses, false);
        assert_eq!(v.verdict, Verdict::Incomplete);
        assert_eq!(v.exit_code, 2);
        assert_eq!(v.missing, vec!["B"]);
        assert_eq!(v.stats.completed, 1);
    }

    #[test]
    fn test_invalid_wins_and_all_are_listed() {
        let plan = vec![
            planned("A", Category::Agent, true),
            planned("B", Category::Agent, true),
            planned("C", Category::Agent, true),
        ];
        let statuses = vec![done_agent("A", "garbage"), done_agent("C", "also garbage")];
        let v = aggregate("r", &plan, &statuses, false);
        assert_eq!(v.verdict, Verdict::Invalid);
        assert_eq!(v.invalid, vec!["A", "C"]);
        assert_eq!(v.missing, vec!["B"]);
    }

    #[test]
    fn test_p0_fails_regardless_of_other_tiers() {
        let plan = vec![planned("A", Category::Agent, true)];
        let v = aggregate("r", &plan, &[done_agent("A", &report(1))], false);
        assert_eq!(v.verdict, Verdict::Fail);
        assert_eq!(v.exit_code, 1);

        let v = aggregate("r", &plan, &[done_agent("A", &report(0))], false);
        assert_eq!(v.verdict, Verdict::Pass);
        assert_eq!(v.stats.counts.p2, 1);
        assert_eq!(v.exit_code, 0);
    }

    #[test]
    fn test_allow_incomplete_aggregates_what_exists() {
        let plan = vec![planned("A", Category::Agent, true), planned("B", Category::Agent, true)];
        let v = aggregate("r", &plan, &[done_agent("A", &report(0))], true);
        assert_eq!(v.verdict, Verdict::Pass);
        assert_eq!(v.missing, vec!["B"]);
    }

    #[test]
    fn test_corrupt_counts_as_missing() {
        let plan = vec![planned("A", Category::Agent, true)];
        let statuses = vec![(
            "A".to_string(),
            StatusRecord::Corrupt {
                reason: "bad json".into(),
            },
        )];
        let v = aggregate("r", &plan, &statuses, false);
        assert_eq!(v.verdict, Verdict::Incomplete);
        assert_eq!(v.corrupt, vec!["A"]);
        assert_eq!(v.participants[0].state, "CORRUPT");
    }

    #[test]
    fn test_tool_failures_tiered_by_requiredness() {
        let plan = vec![
            planned("ruff", Category::StaticTool, true),
            planned("mypy", Category::StaticTool, false),
        ];
        let statuses = vec![
            tool("ruff", ToolSummary::fail("F401", 2)),
            tool("mypy", ToolSummary::fail("errors", 3)),
        ];
        let v = aggregate("r", &plan, &statuses, false);
        assert_eq!(v.stats.counts, PriorityCounts::new(2, 3, 0));
        assert_eq!(v.verdict, Verdict::Fail);

        let statuses = vec![
            tool("ruff", ToolSummary::pass("ok")),
            tool("mypy", ToolSummary::fail("errors", 3)),
        ];
        assert_eq!(aggregate("r", &plan, &statuses, false).verdict, Verdict::Pass);
    }

    #[test]
    fn test_unknown_tool_output_is_invalid() {
        let plan = vec![planned("ruff", Category::StaticTool, true)];
        let statuses = vec![tool("ruff", ToolSummary::new(ToolStatus::Unknown, "?", 0))];
        let v = aggregate("r", &plan, &statuses, false);
        assert_eq!(v.verdict, Verdict::Invalid);
    }

    #[test]
    fn test_extras_aggregate_but_never_gate() {
        let plan = vec![planned("A", Category::Agent, true)];
        let statuses = vec![done_agent("A", &report(0)), done_agent("guest", "garbage")];
        let v = aggregate("r", &plan, &statuses, false);
        assert_eq!(v.verdict, Verdict::Pass);
        assert_eq!(v.stats.extras, 1);
        assert!(v.participants.iter().any(|o| o.is_extra && o.name == "guest"));
    }

    #[test]
    fn test_pending_optional_does_not_gate() {
        let plan = vec![planned("A", Category::Agent, true), planned("opt", Category::Agent, false)];
        let v = aggregate("r", &plan, &[done_agent("A", &report(0))], false);
        assert_eq!(v.verdict, Verdict::Pass);
        assert!(v.missing.is_empty());
    }

    #[test]
    fn test_markdown_lists_missing() {
        let plan = vec![planned("A", Category::Agent, true)];
        let md = aggregate("r", &plan, &[], false).to_markdown();
        assert!(md.contains("# Verdict: INCOMPLETE"));
        assert!(md.contains("Missing: A"));
    }
}
