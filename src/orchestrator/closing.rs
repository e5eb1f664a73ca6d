//! Closing a review: merge the reviewed head, clean up runs and branches.

use anyhow::Result;
use chrono::Utc;
use std::collections::BTreeSet;

use super::workflow::Workflow;
use crate::drift::DriftReason;
use crate::errors::ReviewError;
use crate::layout;
use crate::review::verdict::Verdict;

const REVIEW_BRANCH_PREFIX: &str = "review/";

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub merged: bool,
    pub verdict: Verdict,
    pub target: String,
    pub head: String,
    pub branch_deleted: bool,
}

impl MergeOutcome {
    pub fn exit_code(&self) -> u8 {
        if self.merged { 0 } else { self.verdict.exit_code() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CleanupOptions {
    pub all: bool,
    pub prune_merged: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CleanupOutcome {
    pub removed_runs: Vec<String>,
    pub removed_artifacts: usize,
    pub pruned_branches: Vec<String>,
}

impl Workflow<'_> {
    /// Fast-forward the target branch to the reviewed head after a PASS.
    ///
    /// Any other verdict is a refusal, reported through the outcome.
    pub fn merge(&self, delete_branch: bool) -> Result<MergeOutcome> {
        let mut run = self.current_run()?;
        let verdict = run.verdict.ok_or_else(|| {
            ReviewError::precondition(format!(
                "Run '{}' has no verdict. Run 'tribunal verdict' first",
                run.id
            ))
        })?;
        let head = self.review_head(&run)?.ok_or_else(|| ReviewError::NotFound {
            kind: "Branch",
            name: run.branches.review.clone(),
        })?;

        if verdict != Verdict::Pass {
            tracing::warn!(run = %run.id, %verdict, "merge refused");
            return Ok(MergeOutcome {
                merged: false,
                verdict,
                target: run.branches.target.clone(),
                head,
                branch_deleted: false,
            });
        }
        if let Some(ref planned) = run.digests.head_at_plan
            && *planned != head
        {
            return Err(ReviewError::Drift {
                reasons: vec![DriftReason::HeadChanged.to_string()],
            }
            .into());
        }

        self.cancel.checkpoint("merge")?;
        self.guarded(&mut run, |run| {
            self.vcs.fast_forward(&run.branches.target, &head)?;
            let mut branch_deleted = false;
            if delete_branch {
                self.vcs.delete_branch(&run.branches.review)?;
                branch_deleted = true;
            }
            run.merged_at = Some(Utc::now());
            self.runs().save(run)?;
            tracing::info!(run = %run.id, target = %run.branches.target, %head, "merged");
            Ok(MergeOutcome {
                merged: true,
                verdict,
                target: run.branches.target.clone(),
                head: head.clone(),
                branch_deleted,
            })
        })
    }

    /// Remove run artifacts and, optionally, merged review branches.
    pub fn cleanup(&self, opts: &CleanupOptions) -> Result<CleanupOutcome> {
        let runs = self.runs();
        let current = runs.current_id()?;
        let ids = if opts.all {
            runs.list_ids()?
        } else {
            vec![current.clone().ok_or_else(|| {
                ReviewError::precondition("No current review run to clean up; use --all for every run")
            })?]
        };

        let mut bases = BTreeSet::new();
        for id in &ids {
            match runs.load(id) {
                Ok(run) => {
                    bases.insert(run.branches.base);
                }
                Err(e) => tracing::warn!(run = %id, error = %e, "unreadable run removed anyway"),
            }
        }

        let mut outcome = CleanupOutcome::default();
        for id in ids {
            self.cancel.checkpoint("cleanup")?;
            outcome.removed_artifacts += self.store.remove_prefix(&layout::run_dir(&id))?;
            outcome.removed_runs.push(id);
        }
        if current.is_some_and(|c| opts.all || outcome.removed_runs.contains(&c)) {
            runs.clear_current()?;
        }

        if opts.prune_merged {
            let checked_out = self.vcs.current_branch()?;
            for base in &bases {
                for branch in self.vcs.merged_branches(base, REVIEW_BRANCH_PREFIX)? {
                    if checked_out.as_deref() == Some(branch.as_str()) {
                        tracing::warn!(%branch, "skipping checked-out review branch");
                        continue;
                    }
                    self.vcs.delete_branch(&branch)?;
                    outcome.pruned_branches.push(branch);
                }
            }
        }

        tracing::info!(
            runs = outcome.removed_runs.len(),
            artifacts = outcome.removed_artifacts,
            branches = outcome.pruned_branches.len(),
            "cleanup finished"
        );
        Ok(outcome)
    }
}
