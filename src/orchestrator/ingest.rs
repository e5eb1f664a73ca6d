//! Steps that consume submissions: ingest, status, verdict and handoff.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::state::{Run, RunStatus};
use super::workflow::Workflow;
use crate::classify::{ToolSummary, classifier_for};
use crate::digest::digest_text;
use crate::errors::ReviewError;
use crate::layout;
use crate::plan::{PlanDocument, PlannedParticipant};
use crate::review::contract::ValidationResult;
use crate::review::handoff::{AgentFindings, Confirmation, Handoff, build_handoff};
use crate::review::participants::{
    Category, ParticipantState, ParticipantStatus, StatusRecord, list_statuses, load_status,
    save_status,
};
use crate::review::policy::{Decision, Submission, authorize};
use crate::review::validate_report;
use crate::review::verdict::{ArtifactRefs, FinalVerdict, aggregate};
use crate::store::put_json;

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub participant: String,
    pub content: String,
    /// Submit outside the plan.
    pub extra: bool,
    /// Replace an earlier submission.
    pub overwrite: bool,
    /// Category of an extra submission; planned participants use the plan's.
    pub static_tool: bool,
    /// Exit code of the tool process, when known.
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub status: ParticipantStatus,
    pub replaced: bool,
    pub report_key: String,
    /// Contract validation, agents only.
    pub validation: Option<ValidationResult>,
}

/// One row of the status table.
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantRow {
    pub name: String,
    pub category: Option<Category>,
    /// `None` for extras.
    pub required: Option<bool>,
    pub is_extra: bool,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
    pub errors: usize,
    pub warnings: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Machine-readable view of the current run.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub run: Run,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanDocument>,
    pub participants: Vec<ParticipantRow>,
    pub corrupt: Vec<String>,
}

impl Workflow<'_> {
    /// Accept a report (agent) or raw output (static tool) for a participant.
    pub fn ingest(&self, opts: &IngestOptions) -> Result<IngestOutcome> {
        let run = self.current_run()?;
        if !matches!(run.status, RunStatus::PendingIngest | RunStatus::Completed) {
            return Err(ReviewError::precondition(format!(
                "Run '{}' is {}; requests are written by 'tribunal run'",
                run.id, run.status
            ))
            .into());
        }
        layout::validate_participant_name(&opts.participant)?;
        let plan = self.require_plan(&run)?;
        let planned = plan.get(&opts.participant);

        let category = match planned {
            Some(p) => p.category,
            None if opts.static_tool => Category::StaticTool,
            None => Category::Agent,
        };
        let report_key = layout::report_key(&run.id, &opts.participant, category == Category::Agent);
        let submission = Submission {
            participant: &opts.participant,
            is_extra: opts.extra,
            in_plan: planned.is_some(),
            artifact_exists: self.store.exists(&report_key)?,
            overwrite: opts.overwrite,
        };
        let replaced = match authorize(&submission) {
            Decision::Accept { replaces, .. } => replaces,
            Decision::Reject(rejection) => {
                return Err(ReviewError::precondition(rejection.to_string()).into());
            }
        };

        self.cancel.checkpoint("ingest")?;
        let hash = digest_text(&opts.content);
        let mut status = match load_status(self.store, &run.id, &opts.participant)? {
            StatusRecord::Present(existing) if existing.category == category => existing,
            _ => ParticipantStatus::pending(&opts.participant, category),
        };
        status.is_extra = planned.is_none();

        self.store.put(&report_key, &opts.content)?;
        let result_key = layout::result_key(&run.id, &opts.participant);
        let validation = match category {
            Category::Agent => {
                let result = validate_report(&opts.content);
                put_json(self.store, &result_key, &result)?;
                status.record_report(hash, &result);
                if !result.valid {
                    let violation = ReviewError::ContractViolation {
                        participant: opts.participant.clone(),
                        errors: result.errors.clone(),
                    };
                    tracing::warn!(run = %run.id, "{}", violation);
                }
                Some(result)
            }
            Category::StaticTool => {
                let classifier = classifier_for(&opts.participant, self.config.coverage_threshold);
                let summary: ToolSummary = classifier.classify_with_exit(&opts.content, opts.exit_code);
                put_json(self.store, &result_key, &summary)?;
                status.record_tool_output(hash, summary);
                None
            }
        };
        save_status(self.store, &run.id, &status)?;

        // Any accepted submission makes an earlier verdict stale; merge
        // needs a fresh one.
        let mut run = run;
        if run.verdict.is_some() || run.status == RunStatus::Completed {
            tracing::info!(run = %run.id, "verdict invalidated by new submission");
        }
        run.invalidate_verdict()?;
        run.add_warnings(validation.as_ref().map_or(0, |v| v.warnings.len()));
        self.runs().save(&mut run)?;

        tracing::info!(
            participant = %opts.participant,
            state = %status.state,
            extra = status.is_extra,
            replaced,
            "submission ingested"
        );
        Ok(IngestOutcome {
            status,
            replaced,
            report_key,
            validation,
        })
    }

    /// Snapshot of the current run and every participant.
    pub fn status(&self) -> Result<StatusSnapshot> {
        let run = self.current_run()?;
        let plan = self.load_plan(&run.id)?;
        let statuses = list_statuses(self.store, &run.id)?;

        let mut rows = Vec::new();
        let mut corrupt = Vec::new();
        let planned: Vec<PlannedParticipant> = plan
            .as_ref()
            .map(|p| p.participants.clone())
            .unwrap_or_default();
        let find = |name: &str| statuses.iter().find(|(n, _)| n == name).map(|(_, r)| r);

        for p in &planned {
            let record = find(&p.name).cloned().unwrap_or(StatusRecord::Missing);
            rows.push(row(&p.name, Some(p.category), Some(p.required), false, &record));
        }
        for (name, record) in &statuses {
            if planned.iter().any(|p| &p.name == name) {
                continue;
            }
            let category = record.status().map(|s| s.category);
            rows.push(row(name, category, None, true, record));
        }
        for (name, record) in &statuses {
            if let StatusRecord::Corrupt { reason } = record {
                corrupt.push(format!("{}: {}", name, reason));
            }
        }

        Ok(StatusSnapshot {
            run,
            plan,
            participants: rows,
            corrupt,
        })
    }

    /// Aggregate the submissions and persist the verdict.
    pub fn verdict(&self, allow_incomplete: bool) -> Result<FinalVerdict> {
        let mut run = self.current_run()?;
        if !matches!(run.status, RunStatus::PendingIngest | RunStatus::Completed) {
            return Err(ReviewError::precondition(format!(
                "Run '{}' is {}; nothing to judge before 'tribunal run'",
                run.id, run.status
            ))
            .into());
        }
        self.cancel.checkpoint("verdict")?;

        let statuses = list_statuses(self.store, &run.id)?;
        let plan = self.load_plan(&run.id)?;
        let planned = match plan {
            Some(ref plan) => plan.participants.clone(),
            None => self.participants_from_requests(&run.id, &statuses)?,
        };

        let mut verdict = aggregate(&run.id, &planned, &statuses, allow_incomplete);
        verdict.drift = run.drift.summary();
        verdict.artifacts = ArtifactRefs {
            plan_path: run.plan_path.clone(),
            context: Some(layout::context_key(&run.id)),
            diff: Some(layout::diff_key(&run.id)),
            reports: planned
                .iter()
                .map(|p| (p.name.as_str(), p.category))
                .chain(
                    statuses
                        .iter()
                        .filter_map(|(n, r)| r.status().map(|s| (n.as_str(), s.category))),
                )
                .map(|(name, category)| layout::report_key(&run.id, name, category == Category::Agent))
                .filter(|key| self.store.exists(key).unwrap_or(false))
                .fold(Vec::new(), |mut acc, key| {
                    if !acc.contains(&key) {
                        acc.push(key);
                    }
                    acc
                }),
        };

        put_json(self.store, &layout::verdict_json_key(&run.id), &verdict)?;
        self.store.put(&layout::verdict_md_key(&run.id), &verdict.to_markdown())?;

        run.verdict = Some(verdict.verdict);
        if verdict.verdict.is_final() {
            run.transition(RunStatus::Completed)?;
        }
        self.runs().save(&mut run)?;
        tracing::info!(run = %run.id, verdict = %verdict.verdict, counts = %verdict.stats.counts, "verdict computed");
        Ok(verdict)
    }

    /// Required set when no plan exists: every participant with a request.
    fn participants_from_requests(
        &self,
        run_id: &str,
        statuses: &[(String, StatusRecord)],
    ) -> Result<Vec<PlannedParticipant>> {
        let mut out = Vec::new();
        for key in self.store.list(&layout::requests_prefix(run_id))? {
            let Some(name) = layout::participant_from_key(&key) else {
                continue;
            };
            let category = statuses
                .iter()
                .find(|(n, _)| *n == name)
                .and_then(|(_, r)| r.status().map(|s| s.category))
                .unwrap_or(Category::Agent);
            out.push(PlannedParticipant {
                name,
                category,
                required: true,
                rationale: "request artifact".to_string(),
            });
        }
        if out.is_empty() {
            tracing::warn!(run = run_id, "no plan and no request artifacts");
        }
        Ok(out)
    }

    /// Build patch candidates from the completed agents' findings.
    pub fn handoff(&self) -> Result<(Handoff, Confirmation)> {
        let run = self.current_run()?;
        let plan = self.require_plan(&run)?;
        self.cancel.checkpoint("handoff")?;

        let mut agents = Vec::new();
        for (name, record) in list_statuses(self.store, &run.id)? {
            let category = record.status().map(|s| s.category);
            if category == Some(Category::StaticTool) {
                continue;
            }
            let result_key = layout::result_key(&run.id, &name);
            let (status, findings) = match record {
                StatusRecord::Present(ref s) if s.is_complete() => match self.store.get(&result_key)? {
                    Some(raw) => match serde_json::from_str::<ValidationResult>(&raw) {
                        Ok(result) => ("completed".to_string(), result.findings),
                        Err(e) => {
                            tracing::warn!(participant = %name, error = %e, "unreadable result artifact");
                            ("corrupt_result".to_string(), Vec::new())
                        }
                    },
                    None => ("missing_result".to_string(), Vec::new()),
                },
                ref other => (other.label().to_lowercase(), Vec::new()),
            };
            agents.push(AgentFindings {
                agent: name,
                result_key,
                status,
                findings,
            });
        }
        // Planned agents first, in plan order; extras after.
        agents.sort_by_key(|a| {
            plan.participants
                .iter()
                .position(|p| p.name == a.agent)
                .unwrap_or(usize::MAX)
        });

        let handoff = build_handoff(&run.id, run.plan_path.clone(), agents);
        let confirmation = self.merge_confirmation(&run.id, &handoff)?;
        put_json(self.store, &layout::handoff_key(&run.id), &handoff)?;
        put_json(self.store, &layout::confirmation_key(&run.id), &confirmation)?;
        tracing::info!(
            run = %run.id,
            raw = handoff.raw_patch_candidates.len(),
            deduplicated = handoff.deduplicated_patch_candidates.len(),
            "handoff written"
        );
        Ok((handoff, confirmation))
    }

    /// Fresh template, keeping decisions already recorded for the same patch.
    fn merge_confirmation(&self, run_id: &str, handoff: &Handoff) -> Result<Confirmation> {
        let mut confirmation = handoff.confirmation_template();
        let key = layout::confirmation_key(run_id);
        let Some(raw) = self.store.get(&key)? else {
            return Ok(confirmation);
        };
        match serde_json::from_str::<Confirmation>(&raw) {
            Ok(previous) => {
                for entry in &mut confirmation.decisions {
                    if let Some(old) = previous.decisions.iter().find(|d| d.patch_id == entry.patch_id) {
                        *entry = old.clone();
                    }
                }
            }
            Err(e) => tracing::warn!(%key, error = %e, "replacing unreadable confirmation"),
        }
        Ok(confirmation)
    }
}

fn row(
    name: &str,
    category: Option<Category>,
    required: Option<bool>,
    is_extra: bool,
    record: &StatusRecord,
) -> ParticipantRow {
    let status = record.status();
    let validation = status.and_then(|s| s.validation.as_ref());
    let detail = match record {
        StatusRecord::Corrupt { reason } => Some(reason.clone()),
        _ => status.and_then(|s| match s.state {
            ParticipantState::Invalid => validation.map(|v| v.errors.join("; ")),
            _ => s.tool.as_ref().map(|t| t.reason.clone()),
        }),
    };
    ParticipantRow {
        name: name.to_string(),
        category,
        required,
        is_extra,
        state: record.label(),
        valid: validation.map(|v| v.valid),
        errors: validation.map_or(0, |v| v.errors.len()),
        warnings: validation.map_or(0, |v| v.warnings.len()),
        detail,
        updated_at: status.map(|s| s.updated_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::workflow::tests::Fixture;
    use crate::review::handoff::UserDecision;
    use crate::review::verdict::Verdict;
    use crate::store::ArtifactStore;

    const CLEAN_REPORT: &str = "## Summary\nNothing blocking.\n\n## P2 Findings\n\n### P2-1: Naming\nLocation: src/app.py:1\n\n## Verdict\nPASS\n";
    const BLOCKING_REPORT: &str = "## Summary\nBroken.\n\n## P0 Findings\n\n### P0-1: Crash on start\nLocation: src/app.py:1\n\n## Verdict\nFAIL\n";

    fn ready() -> Fixture {
        let fx = Fixture::new();
        fx.planned();
        fx.workflow().run(false).unwrap();
        fx
    }

    fn ingest(fx: &Fixture, name: &str, content: &str) -> Result<IngestOutcome> {
        fx.workflow().ingest(&IngestOptions {
            participant: name.into(),
            content: content.into(),
            ..Default::default()
        })
    }

    fn submit_all_clean(fx: &Fixture) {
        for agent in ["logic", "code-quality", "silent-failure"] {
            ingest(fx, agent, CLEAN_REPORT).unwrap();
        }
        ingest(fx, "ruff", "All checks passed!\n").unwrap();
        ingest(fx, "pytest", "===== 3 passed in 0.10s =====\n").unwrap();
    }

    #[test]
    fn test_ingest_before_run_is_precondition() {
        let fx = Fixture::new();
        fx.planned();
        let err = ingest(&fx, "logic", CLEAN_REPORT).unwrap_err();
        assert!(err.to_string().contains("tribunal run"));
    }

    #[test]
    fn test_ingest_agent_report_validates() {
        let fx = ready();
        let outcome = ingest(&fx, "logic", CLEAN_REPORT).unwrap();
        assert_eq!(outcome.status.state, ParticipantState::Done);
        assert!(outcome.status.is_complete());
        assert!(outcome.report_key.ends_with("reports/logic.md"));

        let invalid = ingest(&fx, "code-quality", "just words\n").unwrap();
        assert_eq!(invalid.status.state, ParticipantState::Invalid);
        assert!(!invalid.validation.unwrap().valid);
    }

    #[test]
    fn test_ingest_policy_rejections() {
        let fx = ready();
        let err = ingest(&fx, "stranger", CLEAN_REPORT).unwrap_err();
        assert!(err.to_string().contains("--extra"));

        ingest(&fx, "logic", CLEAN_REPORT).unwrap();
        let err = ingest(&fx, "logic", CLEAN_REPORT).unwrap_err();
        assert!(err.to_string().contains("--overwrite"));

        let replaced = fx
            .workflow()
            .ingest(&IngestOptions {
                participant: "logic".into(),
                content: BLOCKING_REPORT.into(),
                overwrite: true,
                ..Default::default()
            })
            .unwrap();
        assert!(replaced.replaced);

        let err = fx
            .workflow()
            .ingest(&IngestOptions {
                participant: "logic".into(),
                content: CLEAN_REPORT.into(),
                extra: true,
                overwrite: true,
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReviewError>(),
            Some(ReviewError::Precondition(_))
        ));

        assert!(ingest(&fx, "../escape", CLEAN_REPORT).is_err());
    }

    #[test]
    fn test_ingest_tool_uses_exit_code() {
        let fx = ready();
        let outcome = fx
            .workflow()
            .ingest(&IngestOptions {
                participant: "ruff".into(),
                content: String::new(),
                exit_code: Some(2),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(outcome.status.state, ParticipantState::Unknown);
        assert!(outcome.report_key.ends_with("reports/ruff.txt"));

        let outcome = fx
            .workflow()
            .ingest(&IngestOptions {
                participant: "mypy".into(),
                content: "Found 2 errors in 1 file (checked 3 source files)\n".into(),
                exit_code: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(outcome.status.state, ParticipantState::Fail);
    }

    #[test]
    fn test_verdict_incomplete_then_pass() {
        let fx = ready();
        ingest(&fx, "logic", CLEAN_REPORT).unwrap();
        let v = fx.workflow().verdict(false).unwrap();
        assert_eq!(v.verdict, Verdict::Incomplete);
        assert_eq!(v.exit_code, 2);
        assert!(v.missing.contains(&"code-quality".to_string()));
        assert_eq!(fx.workflow().current_run().unwrap().status, RunStatus::PendingIngest);

        let v = fx.workflow().verdict(true).unwrap();
        assert_eq!(v.verdict, Verdict::Pass);
        assert!(v.allow_incomplete);
        assert_eq!(fx.workflow().current_run().unwrap().status, RunStatus::Completed);
    }

    #[test]
    fn test_verdict_pass_and_fail() {
        let fx = ready();
        submit_all_clean(&fx);
        let v = fx.workflow().verdict(false).unwrap();
        assert_eq!(v.verdict, Verdict::Pass);
        let run = fx.workflow().current_run().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.verdict, Some(Verdict::Pass));
        assert!(fx.store.exists(&layout::verdict_md_key(&run.id)).unwrap());
        assert_eq!(v.artifacts.reports.len(), 5);

        fx.workflow()
            .ingest(&IngestOptions {
                participant: "security".into(),
                content: BLOCKING_REPORT.into(),
                extra: true,
                ..Default::default()
            })
            .unwrap();
        let v = fx.workflow().verdict(false).unwrap();
        assert_eq!(v.verdict, Verdict::Fail);
        assert_eq!(v.stats.extras, 1);
    }

    #[test]
    fn test_invalid_report_blocks_verdict() {
        let fx = ready();
        submit_all_clean(&fx);
        fx.workflow()
            .ingest(&IngestOptions {
                participant: "logic".into(),
                content: "no structure".into(),
                overwrite: true,
                ..Default::default()
            })
            .unwrap();
        let v = fx.workflow().verdict(false).unwrap();
        assert_eq!(v.verdict, Verdict::Invalid);
        assert_eq!(v.invalid, vec!["logic".to_string()]);
    }

    #[test]
    fn test_corrupt_status_counts_as_missing() {
        let fx = ready();
        submit_all_clean(&fx);
        let run = fx.workflow().current_run().unwrap();
        fx.store.put(&layout::status_key(&run.id, "logic"), "{ nope").unwrap();

        let v = fx.workflow().verdict(false).unwrap();
        assert_eq!(v.verdict, Verdict::Incomplete);
        assert_eq!(v.corrupt, vec!["logic".to_string()]);

        let snapshot = fx.workflow().status().unwrap();
        let logic = snapshot.participants.iter().find(|r| r.name == "logic").unwrap();
        assert_eq!(logic.state, "CORRUPT");
        assert_eq!(snapshot.corrupt.len(), 1);
    }

    #[test]
    fn test_status_lists_planned_and_extras() {
        let fx = ready();
        fx.workflow()
            .ingest(&IngestOptions {
                participant: "eslint".into(),
                content: "\n".into(),
                extra: true,
                static_tool: true,
                ..Default::default()
            })
            .unwrap();
        let snapshot = fx.workflow().status().unwrap();
        let extra = snapshot.participants.iter().find(|r| r.name == "eslint").unwrap();
        assert!(extra.is_extra);
        assert_eq!(extra.required, None);
        assert_eq!(extra.category, Some(Category::StaticTool));
        let logic = snapshot.participants.iter().find(|r| r.name == "logic").unwrap();
        assert_eq!(logic.state, "PENDING");
        assert_eq!(logic.required, Some(true));
    }

    #[test]
    fn test_handoff_collects_findings_and_keeps_decisions() {
        let fx = ready();
        ingest(&fx, "logic", BLOCKING_REPORT).unwrap();
        ingest(&fx, "code-quality", BLOCKING_REPORT).unwrap();
        ingest(&fx, "silent-failure", CLEAN_REPORT).unwrap();

        let (handoff, confirmation) = fx.workflow().handoff().unwrap();
        assert_eq!(handoff.findings.len(), 3);
        assert_eq!(handoff.raw_patch_candidates.len(), 3);
        assert_eq!(handoff.deduplicated_patch_candidates.len(), 2);
        let first = &handoff.deduplicated_patch_candidates[0];
        assert_eq!(first.source_agents, vec!["logic", "code-quality"]);
        assert!(handoff.agent_outputs.contains_key("logic"));
        assert!(!handoff.agent_outputs.contains_key("ruff"));

        let mut edited = confirmation.clone();
        edited.decisions[0].user_decision = UserDecision::Approved;
        let run = fx.workflow().current_run().unwrap();
        put_json(&fx.store, &layout::confirmation_key(&run.id), &edited).unwrap();

        let (_, again) = fx.workflow().handoff().unwrap();
        assert_eq!(again.decisions[0].user_decision, UserDecision::Approved);
        assert_eq!(again.decisions[1].user_decision, UserDecision::Deferred);
    }

    #[test]
    fn test_approval_stays_with_its_patch_when_ranking_changes() {
        let fx = ready();
        ingest(&fx, "logic", CLEAN_REPORT).unwrap();
        let (handoff, confirmation) = fx.workflow().handoff().unwrap();
        assert_eq!(handoff.deduplicated_patch_candidates.len(), 1);
        let naming_id = handoff.deduplicated_patch_candidates[0].id.clone();

        let mut edited = confirmation.clone();
        edited.decisions[0].user_decision = UserDecision::Approved;
        let run = fx.workflow().current_run().unwrap();
        put_json(&fx.store, &layout::confirmation_key(&run.id), &edited).unwrap();

        // A P0 arrives and now ranks first.
        ingest(&fx, "code-quality", BLOCKING_REPORT).unwrap();
        let (handoff, again) = fx.workflow().handoff().unwrap();
        let dedup = &handoff.deduplicated_patch_candidates;
        assert_eq!(dedup[0].title, "Crash on start");
        assert_eq!(dedup[1].id, naming_id);

        let decision = |id: &str| {
            again
                .decisions
                .iter()
                .find(|d| d.patch_id == id)
                .map(|d| d.user_decision)
                .unwrap()
        };
        assert_eq!(decision(&naming_id), UserDecision::Approved);
        assert_eq!(decision(&dedup[0].id), UserDecision::Deferred);
    }

    #[test]
    fn test_ingest_after_verdict_reopens_run() {
        let fx = ready();
        submit_all_clean(&fx);
        fx.workflow().verdict(false).unwrap();
        assert_eq!(fx.workflow().current_run().unwrap().status, RunStatus::Completed);

        fx.workflow()
            .ingest(&IngestOptions {
                participant: "logic".into(),
                content: BLOCKING_REPORT.into(),
                overwrite: true,
                ..Default::default()
            })
            .unwrap();
        let run = fx.workflow().current_run().unwrap();
        assert_eq!(run.status, RunStatus::PendingIngest);
        assert_eq!(run.verdict, None);

        let v = fx.workflow().verdict(false).unwrap();
        assert_eq!(v.verdict, Verdict::Fail);
        assert_eq!(fx.workflow().current_run().unwrap().verdict, Some(Verdict::Fail));
    }
}
