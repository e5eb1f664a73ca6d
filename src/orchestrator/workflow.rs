use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use super::CancelFlag;
use super::requests::render_request;
use super::state::{Branches, Run, RunStatus, RunStore};
use crate::config::Config;
use crate::digest::digest_text;
use crate::drift::{DriftStatus, Snapshot};
use crate::errors::ReviewError;
use crate::layout;
use crate::plan::resolver::{self, PlanStatus, Resolution};
use crate::plan::{PlanDocument, PlanFrontMatter};
use crate::review::participants::{ParticipantStatus, StatusRecord, load_status, save_status};
use crate::store::{ArtifactStore, put_json};
use crate::util::{short_sha, slugify};
use crate::vcs::{DiffStat, Vcs};

/// Longest slug used in branch names and run ids.
const SLUG_LEN: usize = 40;

/// The review engine bound to one project's configuration, artifact store
/// and repository.
pub struct Workflow<'a> {
    pub(super) config: &'a Config,
    pub(super) store: &'a dyn ArtifactStore,
    pub(super) vcs: &'a dyn Vcs,
    pub(super) cancel: CancelFlag,
}

#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    pub base: String,
    /// Defaults to the checked-out branch.
    pub target: Option<String>,
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExploreKind {
    Context,
    Diff,
}

#[derive(Debug, Clone)]
pub struct ExploreOutcome {
    pub kind: ExploreKind,
    pub key: String,
    pub digest: String,
    pub stat: DiffStat,
}

#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub plan: PlanDocument,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub requests: Vec<String>,
    /// Participants newly set to PENDING.
    pub pending: usize,
    pub drift: DriftStatus,
    pub override_used: bool,
}

impl<'a> Workflow<'a> {
    pub fn new(
        config: &'a Config,
        store: &'a dyn ArtifactStore,
        vcs: &'a dyn Vcs,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            config,
            store,
            vcs,
            cancel,
        }
    }

    pub fn runs(&self) -> RunStore<'a> {
        RunStore::new(self.store)
    }

    pub fn current_run(&self) -> Result<Run> {
        self.runs().load_current()
    }

    /// Start a new review of `target` against `base`.
    pub fn init(&self, opts: &InitOptions) -> Result<Run> {
        let runs = self.runs();
        if let Some(current) = runs.current_id()?
            && !opts.force
        {
            return Err(ReviewError::precondition(format!(
                "Run '{}' is still current. Remove it with 'tribunal cleanup' or pass --force",
                current
            ))
            .into());
        }

        let target = match opts.target {
            Some(ref target) => target.clone(),
            None => self.vcs.current_branch()?.ok_or_else(|| {
                ReviewError::precondition("HEAD is not on a branch; pass --target")
            })?,
        };
        if target == opts.base {
            return Err(ReviewError::precondition(format!(
                "Base and target are both '{}'",
                target
            ))
            .into());
        }

        let base_commit = self.vcs.resolve_ref(&opts.base)?;
        let target_commit = self.vcs.resolve_ref(&target)?;
        let target_slug = non_empty(slugify(&target, SLUG_LEN), "target");
        let review = format!(
            "review/{}--{}--{}",
            non_empty(slugify(&opts.base, SLUG_LEN), "base"),
            target_slug,
            short_sha(&target_commit)
        );
        if self.vcs.branch_exists(&review)? && !opts.force {
            return Err(ReviewError::precondition(format!(
                "Review branch '{}' already exists; pass --force to reset it",
                review
            ))
            .into());
        }

        self.cancel.checkpoint("init")?;
        self.vcs.create_branch(&review, &target_commit, opts.force)?;

        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let id = format!("{}-{}", target_slug, &suffix[..8]);
        let mut run = Run::new(
            id,
            Branches {
                review,
                base: opts.base.clone(),
                target,
            },
            base_commit,
            target_commit,
        );
        runs.save(&mut run)?;
        runs.set_current(&run.id)?;
        tracing::info!(run = %run.id, branch = %run.branches.review, "review run initialized");
        Ok(run)
    }

    /// Write the context or diff artifact of the current run.
    ///
    /// Exploring again after planning only refreshes the artifact; the
    /// planned snapshot then reports it as drift.
    pub fn explore(&self, kind: ExploreKind) -> Result<ExploreOutcome> {
        let mut run = self.current_run()?;
        if matches!(
            run.status,
            RunStatus::Pending | RunStatus::Exploring | RunStatus::Failed
        ) {
            run.transition(RunStatus::Exploring)?;
        }

        self.guarded(&mut run, |run| {
            self.cancel.checkpoint("explore")?;
            let stat = self.vcs.diff_stat(&run.base_commit, &run.branches.review)?;
            let (key, content) = match kind {
                ExploreKind::Context => (layout::context_key(&run.id), self.render_context(run, &stat)?),
                ExploreKind::Diff => (
                    layout::diff_key(&run.id),
                    self.vcs.diff_text(&run.base_commit, &run.branches.review)?,
                ),
            };
            self.store.put(&key, &content)?;
            self.runs().save(run)?;
            tracing::info!(run = %run.id, %key, files = stat.files, "explored");
            Ok(ExploreOutcome {
                kind,
                digest: digest_text(&content),
                key,
                stat,
            })
        })
    }

    fn render_context(&self, run: &Run, stat: &DiffStat) -> Result<String> {
        let files = self.vcs.changed_files(&run.base_commit, &run.branches.review)?;
        let mut md = String::new();
        let _ = writeln!(md, "# Review Context: {}\n", run.id);
        let _ = writeln!(md, "- Review branch: `{}`", run.branches.review);
        let _ = writeln!(md, "- Base: `{}` at {}", run.branches.base, run.base_commit);
        let _ = writeln!(md, "- Target: `{}` at {}", run.branches.target, run.target_commit);
        let _ = writeln!(
            md,
            "- Diff: {} files, +{} -{}",
            stat.files, stat.insertions, stat.deletions
        );
        let _ = writeln!(md, "\n## Changed Files\n");
        if files.is_empty() {
            let _ = writeln!(md, "No changes.");
        }
        for file in &files {
            let kind = serde_json::to_value(file.change)?;
            let _ = writeln!(md, "- `{}` ({})", file.path, kind.as_str().unwrap_or("changed"));
        }
        Ok(md)
    }

    /// Resolve the SSOT plan, fix the participants and snapshot the inputs.
    pub fn plan(&self, explicit: Option<&Path>) -> Result<PlanOutcome> {
        let mut run = self.current_run()?;
        for (key, what) in [
            (layout::context_key(&run.id), "context"),
            (layout::diff_key(&run.id), "diff"),
        ] {
            if !self.store.exists(&key)? {
                return Err(ReviewError::precondition(format!(
                    "No {} artifact for run '{}'. Run 'tribunal explore {}' first",
                    what, run.id, what
                ))
                .into());
            }
        }
        run.transition(RunStatus::Planning)?;

        self.guarded(&mut run, |run| {
            self.cancel.checkpoint("plan")?;
            let resolution = match explicit {
                Some(path) => {
                    let file = self.absolute(path);
                    if !file.is_file() {
                        return Err(ReviewError::NotFound {
                            kind: "Plan",
                            name: path.display().to_string(),
                        }
                        .into());
                    }
                    Resolution::explicit(self.config.relative(&file))
                }
                None => {
                    let allowlist = self.config.allowlist_dir();
                    let candidates = resolver::discover(
                        &self.config.project_dir,
                        &self.config.plan_roots,
                        allowlist.as_deref(),
                    )?;
                    resolver::resolve(&candidates, &run.branches.review)
                }
            };

            let plan_file = resolution.path.as_deref().map(|p| self.absolute(Path::new(p)));
            let front_matter = match plan_file {
                Some(ref file) => {
                    let text = std::fs::read_to_string(file)
                        .with_context(|| format!("Failed to read plan: {}", file.display()))?;
                    PlanFrontMatter::parse(&text)?
                }
                None => None,
            };

            let mut warnings = Vec::new();
            match resolution.status {
                PlanStatus::Found => {}
                PlanStatus::Missing => {
                    warnings.push("No SSOT plan found; reviewers work without one".to_string())
                }
                PlanStatus::Ambiguous => warnings.push(format!(
                    "SSOT plan is ambiguous between {} candidates; choose one with --plan-path",
                    resolution.candidates.len()
                )),
            }

            let changed: Vec<String> = self
                .vcs
                .changed_files(&run.base_commit, &run.branches.review)?
                .into_iter()
                .map(|f| f.path)
                .collect();
            let plan = PlanDocument::build(
                &run.id,
                self.config,
                resolution,
                front_matter.as_ref(),
                changed,
            )?;
            if !plan.dropped.is_empty() {
                warnings.push(format!(
                    "Optional participants dropped by the limit of {}: {}",
                    plan.max_participants,
                    plan.dropped.join(", ")
                ));
            }

            put_json(self.store, &layout::plan_summary_key(&run.id), &plan)?;
            self.store.put(&layout::plan_doc_key(&run.id), &plan.to_markdown())?;

            let head = self.review_head(run)?;
            run.digests = Snapshot::capture(self.store, &run.id, plan_file.as_deref(), head)?;
            run.drift.reset_for_plan();
            run.plan_status = Some(plan.resolution.status);
            run.plan_path = plan.resolution.path.clone();
            run.verdict = None;
            run.add_warnings(warnings.len());
            for warning in &warnings {
                tracing::warn!(run = %run.id, "{}", warning);
            }
            self.runs().save(run)?;
            tracing::info!(
                run = %run.id,
                status = %plan.resolution.status,
                participants = plan.participants.len(),
                "plan fixed"
            );
            Ok(PlanOutcome { plan, warnings })
        })
    }

    /// Check drift and emit one request per planned participant.
    pub fn run(&self, override_drift: bool) -> Result<RunOutcome> {
        let mut run = self.current_run()?;
        let plan = self.require_plan(&run)?;
        if plan.resolution.status == PlanStatus::Ambiguous {
            let candidates: Vec<&str> = plan
                .resolution
                .candidates
                .iter()
                .map(|c| c.path.as_str())
                .collect();
            return Err(ReviewError::precondition(format!(
                "SSOT plan is ambiguous ({}). Re-run 'tribunal plan --plan-path <file>'",
                candidates.join(", ")
            ))
            .into());
        }
        if !run.status.can_transition(RunStatus::Running) {
            return Err(ReviewError::precondition(format!(
                "Run '{}' is {}; re-run 'tribunal plan' first",
                run.id, run.status
            ))
            .into());
        }

        let head = self.review_head(&run)?;
        let plan_file = self.plan_file(&run);
        let now = Snapshot::capture(self.store, &run.id, plan_file.as_deref(), head)?;
        let reasons = run.digests.compare(&now);
        if let Err(err) = run.drift.apply(reasons, override_drift) {
            // The confirmation must survive the refusal.
            self.runs().save(&mut run)?;
            return Err(err.into());
        }
        run.transition(RunStatus::Running)?;

        self.guarded(&mut run, |run| {
            self.runs().save(run)?;
            self.remove_stale_requests(&run.id, &plan)?;

            let mut requests = Vec::new();
            let mut pending = 0;
            for participant in &plan.participants {
                self.cancel.checkpoint("requests")?;
                let key = layout::request_key(&run.id, &participant.name);
                self.store.put(&key, &render_request(run, &plan, participant))?;
                if !matches!(
                    load_status(self.store, &run.id, &participant.name)?,
                    StatusRecord::Present(_)
                ) {
                    save_status(
                        self.store,
                        &run.id,
                        &ParticipantStatus::pending(&participant.name, participant.category),
                    )?;
                    pending += 1;
                }
                requests.push(key);
            }

            run.transition(RunStatus::PendingIngest)?;
            self.runs().save(run)?;
            tracing::info!(run = %run.id, requests = requests.len(), "requests written");
            Ok(RunOutcome {
                requests,
                pending,
                drift: run.drift.status,
                override_used: run.drift.override_used,
            })
        })
    }

    fn remove_stale_requests(&self, run_id: &str, plan: &PlanDocument) -> Result<()> {
        for key in self.store.list(&layout::requests_prefix(run_id))? {
            if let Some(name) = layout::participant_from_key(&key)
                && !plan.contains(&name)
            {
                tracing::debug!(%key, "removing request dropped from the plan");
                self.store.remove_prefix(&key)?;
            }
        }
        Ok(())
    }

    pub(super) fn load_plan(&self, run_id: &str) -> Result<Option<PlanDocument>> {
        let key = layout::plan_summary_key(run_id);
        match self.store.get(&key)? {
            Some(raw) => Ok(Some(PlanDocument::parse(&key, &raw)?)),
            None => Ok(None),
        }
    }

    pub(super) fn require_plan(&self, run: &Run) -> Result<PlanDocument> {
        self.load_plan(&run.id)?.ok_or_else(|| {
            ReviewError::precondition(format!(
                "Run '{}' has no plan. Run 'tribunal plan' first",
                run.id
            ))
            .into()
        })
    }

    pub(super) fn plan_file(&self, run: &Run) -> Option<PathBuf> {
        run.plan_path.as_deref().map(|p| self.absolute(Path::new(p)))
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config.project_dir.join(path)
        }
    }

    /// Head of the review branch; `None` once the branch is gone.
    pub(super) fn review_head(&self, run: &Run) -> Result<Option<String>> {
        match self.vcs.resolve_ref(&run.branches.review) {
            Ok(sha) => Ok(Some(sha)),
            Err(e) if matches!(e.downcast_ref::<ReviewError>(), Some(ReviewError::NotFound { .. })) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Run `step` against `run`. Errors outside the workflow taxonomy
    /// (I/O, repository) move the run to `failed`.
    pub(super) fn guarded<T>(&self, run: &mut Run, step: impl FnOnce(&mut Run) -> Result<T>) -> Result<T> {
        let result = step(run);
        if let Err(ref err) = result
            && err.downcast_ref::<ReviewError>().is_none()
        {
            tracing::error!(run = %run.id, error = %format!("{:#}", err), "step failed");
            run.fail(format!("{:#}", err));
            if let Err(save_err) = self.runs().save(run) {
                tracing::warn!(error = %save_err, "could not record run failure");
            }
        }
        result
    }
}

fn non_empty(slug: String, fallback: &str) -> String {
    if slug.is_empty() {
        fallback.to_string()
    } else {
        slug
    }
}
