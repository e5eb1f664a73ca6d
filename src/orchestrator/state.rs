//! Persisted run state.
//!
//! A [`Run`] is stored as `runs/<id>/run.json` with a `schema_version`.
//! Records are validated on every read. Version 1 records (flat drift and
//! digest fields) are upgraded explicitly; anything else is corrupt.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::drift::{DriftReason, DriftState, DriftStatus, Snapshot};
use crate::errors::ReviewError;
use crate::layout;
use crate::plan::resolver::PlanStatus;
use crate::review::verdict::Verdict;
use crate::store::{ArtifactStore, put_json};

pub const RUN_SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Exploring,
    Planning,
    Running,
    PendingIngest,
    Completed,
    Failed,
}

impl RunStatus {
    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Exploring => 1,
            Self::Planning => 2,
            Self::Running => 3,
            Self::PendingIngest => 4,
            Self::Completed => 5,
            Self::Failed => 6,
        }
    }

    /// Allowed moves: the next forward step, re-entry into an earlier (or
    /// the same) working phase, recovery from `failed`, and `failed` from
    /// anywhere.
    pub fn can_transition(&self, to: RunStatus) -> bool {
        use RunStatus::*;
        match (*self, to) {
            (_, Failed) => true,
            (Pending, Exploring)
            | (Exploring, Planning)
            | (Planning, Running)
            | (Running, PendingIngest)
            | (PendingIngest, Completed)
            | (Completed, Completed)
            | (Completed, PendingIngest) => true,
            (Failed, Exploring | Planning | Running) => true,
            (from, Exploring | Planning | Running) => from != Pending && from.rank() >= to.rank(),
            _ => false,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Exploring => "exploring",
            Self::Planning => "planning",
            Self::Running => "running",
            Self::PendingIngest => "pending_ingest",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branches {
    pub review: String,
    pub base: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub schema_version: u32,
    pub id: String,
    pub branches: Branches,
    pub base_commit: String,
    pub target_commit: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_status: Option<PlanStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_path: Option<String>,
    #[serde(default)]
    pub drift: DriftState,
    #[serde(default)]
    pub digests: Snapshot,
    #[serde(default)]
    pub warning_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_at: Option<DateTime<Utc>>,
    /// Message of the error that moved the run to `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl Run {
    pub fn new(id: String, branches: Branches, base_commit: String, target_commit: String) -> Self {
        let now = Utc::now();
        Self {
            schema_version: RUN_SCHEMA_VERSION,
            id,
            branches,
            base_commit,
            target_commit,
            created_at: now,
            updated_at: now,
            status: RunStatus::Pending,
            plan_status: None,
            plan_path: None,
            drift: DriftState::default(),
            digests: Snapshot::default(),
            warning_count: 0,
            verdict: None,
            merged_at: None,
            failure: None,
        }
    }

    pub fn transition(&mut self, to: RunStatus) -> Result<(), ReviewError> {
        if !self.status.can_transition(to) {
            return Err(ReviewError::precondition(format!(
                "Run '{}' cannot move from {} to {}",
                self.id, self.status, to
            )));
        }
        tracing::debug!(run = %self.id, from = %self.status, to = %to, "run transition");
        self.status = to;
        if to != RunStatus::Failed {
            self.failure = None;
        }
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = RunStatus::Failed;
        self.failure = Some(message.into());
    }

    /// A submission changed after judging: the verdict no longer describes
    /// the submissions, so drop it and wait for a fresh one.
    pub fn invalidate_verdict(&mut self) -> Result<(), ReviewError> {
        self.verdict = None;
        if self.status == RunStatus::Completed {
            self.transition(RunStatus::PendingIngest)?;
        }
        Ok(())
    }

    pub fn add_warnings(&mut self, n: usize) {
        self.warning_count = self.warning_count.saturating_add(n as u32);
    }

    fn check(&self, expected_id: &str) -> std::result::Result<(), String> {
        if self.id != expected_id {
            return Err(format!("record id '{}' does not match '{}'", self.id, expected_id));
        }
        if self.branches.review.is_empty() || self.branches.base.is_empty() || self.branches.target.is_empty() {
            return Err("branch names must not be empty".to_string());
        }
        if self.updated_at < self.created_at {
            return Err("updated_at precedes created_at".to_string());
        }
        if self.plan_status == Some(PlanStatus::Found) && self.plan_path.is_none() {
            return Err("plan FOUND without a plan path".to_string());
        }
        Ok(())
    }

    /// Parse, upgrade and validate a persisted run record.
    pub fn parse(expected_id: &str, key: &str, raw: &str) -> Result<Self, ReviewError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| ReviewError::corrupt(key, e.to_string()))?;
        let version = value
            .get("schema_version")
            .and_then(|v| v.as_u64())
            .unwrap_or(1);
        let run = match version {
            2 => serde_json::from_value::<Run>(value)
                .map_err(|e| ReviewError::corrupt(key, e.to_string()))?,
            1 => {
                let v1 = serde_json::from_value::<RunV1>(value)
                    .map_err(|e| ReviewError::corrupt(key, e.to_string()))?;
                tracing::info!(run = %v1.id, "upgrading run record from schema 1");
                Run::from(v1)
            }
            other => {
                return Err(ReviewError::corrupt(
                    key,
                    format!("unsupported schema_version {}", other),
                ));
            }
        };
        run.check(expected_id)
            .map_err(|reason| ReviewError::corrupt(key, reason))?;
        Ok(run)
    }
}

/// Schema 1 layout: flat branch, digest and drift fields.
#[derive(Debug, Deserialize)]
struct RunV1 {
    id: String,
    review_branch: String,
    base_branch: String,
    target_branch: String,
    #[serde(default)]
    base_commit: String,
    #[serde(default)]
    target_commit: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    status: RunStatus,
    #[serde(default)]
    plan_status: Option<PlanStatus>,
    #[serde(default)]
    plan_path: Option<String>,
    #[serde(default)]
    drift_status: Option<DriftStatus>,
    #[serde(default)]
    drift_reasons: Vec<DriftReason>,
    #[serde(default)]
    drift_override_used: bool,
    #[serde(default)]
    context_digest: Option<String>,
    #[serde(default)]
    diff_digest: Option<String>,
    #[serde(default)]
    plan_digest: Option<String>,
    #[serde(default)]
    head_at_plan: Option<String>,
    #[serde(default)]
    warning_count: u32,
}

impl From<RunV1> for Run {
    fn from(v1: RunV1) -> Self {
        Self {
            schema_version: RUN_SCHEMA_VERSION,
            id: v1.id,
            branches: Branches {
                review: v1.review_branch,
                base: v1.base_branch,
                target: v1.target_branch,
            },
            base_commit: v1.base_commit,
            target_commit: v1.target_commit,
            updated_at: v1.updated_at.unwrap_or(v1.created_at),
            created_at: v1.created_at,
            status: v1.status,
            plan_status: v1.plan_status,
            plan_path: v1.plan_path,
            drift: DriftState {
                status: v1.drift_status.unwrap_or_default(),
                reasons: v1.drift_reasons,
                override_used: v1.drift_override_used,
                checked_at: None,
            },
            digests: Snapshot {
                context: v1.context_digest,
                diff: v1.diff_digest,
                plan: v1.plan_digest,
                head_at_plan: v1.head_at_plan,
            },
            warning_count: v1.warning_count,
            verdict: None,
            merged_at: None,
            failure: None,
        }
    }
}

/// Run records plus the `current` pointer.
pub struct RunStore<'a> {
    store: &'a dyn ArtifactStore,
}

impl<'a> RunStore<'a> {
    pub fn new(store: &'a dyn ArtifactStore) -> Self {
        Self { store }
    }

    pub fn load(&self, id: &str) -> Result<Run> {
        let key = layout::run_key(id);
        let raw = self.store.get(&key)?.ok_or_else(|| ReviewError::NotFound {
            kind: "Run",
            name: id.to_string(),
        })?;
        Ok(Run::parse(id, &key, &raw)?)
    }

    pub fn save(&self, run: &mut Run) -> Result<()> {
        run.updated_at = Utc::now().max(run.created_at);
        put_json(self.store, &layout::run_key(&run.id), run)
    }

    pub fn exists(&self, id: &str) -> Result<bool> {
        self.store.exists(&layout::run_key(id))
    }

    pub fn current_id(&self) -> Result<Option<String>> {
        Ok(self
            .store
            .get(layout::CURRENT_KEY)?
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()))
    }

    pub fn set_current(&self, id: &str) -> Result<()> {
        self.store.put(layout::CURRENT_KEY, &format!("{}\n", id))
    }

    pub fn clear_current(&self) -> Result<()> {
        self.store.remove_prefix(layout::CURRENT_KEY).map(|_| ())
    }

    /// The current run, or a precondition error pointing at `init`.
    pub fn load_current(&self) -> Result<Run> {
        let id = self.current_id()?.ok_or_else(|| {
            ReviewError::precondition("No current review run. Start one with 'tribunal init'")
        })?;
        self.load(&id)
    }

    /// Ids of every stored run, sorted.
    pub fn list_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .store
            .list("runs/")?
            .into_iter()
            .filter(|k| k.ends_with("/run.json"))
            .filter_map(|k| k.split('/').nth(1).map(str::to_string))
            .collect();
        ids.dedup();
        Ok(ids)
    }
}
