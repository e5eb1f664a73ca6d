//! Drift detection between planning and execution.
//!
//! At plan time a [`Snapshot`] of digests is captured onto the run: the
//! context and diff artifacts, the SSOT plan file, and the review-branch
//! head. Before requests are emitted the snapshot is recomputed and
//! compared. Any difference is drift; drift blocks execution unless the
//! operator overrides it, and an override is remembered forever.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::digest::{digest_file, digest_text};
use crate::errors::ReviewError;
use crate::layout;
use crate::store::ArtifactStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriftStatus {
    #[default]
    Unchecked,
    Clean,
    DriftConfirmed,
    DriftOverride,
}

impl fmt::Display for DriftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unchecked => "UNCHECKED",
            Self::Clean => "CLEAN",
            Self::DriftConfirmed => "DRIFT_CONFIRMED",
            Self::DriftOverride => "DRIFT_OVERRIDE",
        };
        write!(f, "{}", s)
    }
}

/// Why a snapshot no longer matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftReason {
    HeadChanged,
    HeadMissing,
    ContextChanged,
    ContextMissing,
    DiffChanged,
    DiffMissing,
    PlanChanged,
    PlanMissing,
}

impl fmt::Display for DriftReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::HeadChanged => "head_changed",
            Self::HeadMissing => "head_missing",
            Self::ContextChanged => "context_changed",
            Self::ContextMissing => "context_missing",
            Self::DiffChanged => "diff_changed",
            Self::DiffMissing => "diff_missing",
            Self::PlanChanged => "plan_changed",
            Self::PlanMissing => "plan_missing",
        };
        write!(f, "{}", s)
    }
}

/// Digests captured at a lifecycle point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    /// Review-branch head commit id at plan time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_at_plan: Option<String>,
}

impl Snapshot {
    /// Digest the current artifacts of `run_id`.
    pub fn capture(
        store: &dyn ArtifactStore,
        run_id: &str,
        plan_file: Option<&Path>,
        head: Option<String>,
    ) -> Result<Self> {
        let context = store
            .get(&layout::context_key(run_id))?
            .map(|text| digest_text(&text));
        let diff = store
            .get(&layout::diff_key(run_id))?
            .map(|text| digest_text(&text));
        let plan = plan_file.and_then(digest_file);
        Ok(Self {
            context,
            diff,
            plan,
            head_at_plan: head,
        })
    }

    /// Reasons `now` differs from `self`, in a fixed order.
    ///
    /// Only what was captured before is compared; an artifact that appeared
    /// since is not drift.
    pub fn compare(&self, now: &Snapshot) -> Vec<DriftReason> {
        let pairs = [
            (&self.head_at_plan, &now.head_at_plan, DriftReason::HeadChanged, DriftReason::HeadMissing),
            (&self.context, &now.context, DriftReason::ContextChanged, DriftReason::ContextMissing),
            (&self.diff, &now.diff, DriftReason::DiffChanged, DriftReason::DiffMissing),
            (&self.plan, &now.plan, DriftReason::PlanChanged, DriftReason::PlanMissing),
        ];
        let mut reasons = Vec::new();
        for (before, after, changed, missing) in pairs {
            match (before, after) {
                (Some(a), Some(b)) if a != b => reasons.push(changed),
                (Some(_), None) => reasons.push(missing),
                _ => {}
            }
        }
        reasons
    }
}

/// Drift bookkeeping persisted on the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftState {
    pub status: DriftStatus,
    #[serde(default)]
    pub reasons: Vec<DriftReason>,
    /// Set the first time drift is overridden; never cleared.
    #[serde(default)]
    pub override_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked_at: Option<DateTime<Utc>>,
}

impl DriftState {
    /// Whether execution is facing drift: fresh reasons, or a confirmation
    /// persisted by an earlier check.
    pub fn drift_detected(&self, reasons: &[DriftReason]) -> bool {
        !reasons.is_empty() || self.status == DriftStatus::DriftConfirmed
    }

    /// Apply a check result. Mutates the state in every case so the caller
    /// can persist it before propagating a refusal.
    pub fn apply(&mut self, reasons: Vec<DriftReason>, allow_override: bool) -> Result<(), ReviewError> {
        let detected = self.drift_detected(&reasons);
        self.checked_at = Some(Utc::now());

        if !detected {
            self.status = DriftStatus::Clean;
            self.reasons.clear();
            return Ok(());
        }

        // A persisted confirmation keeps its original reasons when nothing new is found.
        if !reasons.is_empty() {
            self.reasons = reasons;
        }

        if allow_override {
            tracing::warn!(reasons = ?self.reasons, "drift overridden");
            self.status = DriftStatus::DriftOverride;
            self.override_used = true;
            Ok(())
        } else {
            self.status = DriftStatus::DriftConfirmed;
            Err(ReviewError::Drift {
                reasons: self.reasons.iter().map(|r| r.to_string()).collect(),
            })
        }
    }

    /// New snapshots were captured: forget confirmed drift, keep the sticky flag.
    pub fn reset_for_plan(&mut self) {
        self.status = DriftStatus::Unchecked;
        self.reasons.clear();
        self.checked_at = None;
    }

    pub fn summary(&self) -> String {
        let mut s = self.status.to_string();
        if !self.reasons.is_empty() {
            let reasons: Vec<String> = self.reasons.iter().map(|r| r.to_string()).collect();
            s.push_str(&format!(" ({})", reasons.join(", ")));
        }
        if self.override_used {
            s.push_str(" [override used]");
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn snap(head: &str, context: &str, diff: &str, plan: Option<&str>) -> Snapshot {
        Snapshot {
            context: Some(digest_text(context)),
            diff: Some(digest_text(diff)),
            plan: plan.map(digest_text),
            head_at_plan: Some(head.to_string()),
        }
    }

    #[test]
    fn test_identical_snapshots_have_no_drift() {
        let a = snap("h1", "ctx", "diff", Some("plan"));
        assert!(a.compare(&a.clone()).is_empty());
    }

    #[test]
    fn test_each_difference_is_a_distinct_reason() {
        let before = snap("h1", "ctx", "diff", Some("plan"));
        let after = snap("h2", "ctx2", "diff2", Some("plan2"));
        assert_eq!(
            before.compare(&after),
            vec![
                DriftReason::HeadChanged,
                DriftReason::ContextChanged,
                DriftReason::DiffChanged,
                DriftReason::PlanChanged,
            ]
        );
    }

    #[test]
    fn test_missing_artifacts_reported() {
        let before = snap("h1", "ctx", "diff", Some("plan"));
        let after = Snapshot {
            plan: None,
            diff: None,
            ..before.clone()
        };
        assert_eq!(
            before.compare(&after),
            vec![DriftReason::DiffMissing, DriftReason::PlanMissing]
        );
        // Appearing artifacts are not drift
        assert!(after.compare(&before).is_empty());
    }

    #[test]
    fn test_capture_from_store() {
        let store = MemoryStore::new();
        store.put(&layout::context_key("r"), "ctx").unwrap();
        let s = Snapshot::capture(&store, "r", None, Some("abc".into())).unwrap();
        assert_eq!(s.context, Some(digest_text("ctx")));
        assert_eq!(s.diff, None);
        assert_eq!(s.head_at_plan.as_deref(), Some("abc"));
    }

    #[test]
    fn test_drift_without_override_confirms_and_refuses() {
        let mut state = DriftState::default();
        let err = state.apply(vec![DriftReason::DiffChanged], false).unwrap_err();
        assert!(matches!(err, ReviewError::Drift { .. }));
        assert_eq!(state.status, DriftStatus::DriftConfirmed);
        assert!(!state.override_used);

        // Confirmed drift persists even when a later check finds nothing new
        let err = state.apply(vec![], false).unwrap_err();
        assert!(err.to_string().contains("diff_changed"));
    }

    #[test]
    fn test_override_is_sticky() {
        let mut state = DriftState::default();
        let _ = state.apply(vec![DriftReason::HeadChanged], false);
        state.apply(vec![], true).unwrap();
        assert_eq!(state.status, DriftStatus::DriftOverride);
        assert!(state.override_used);

        state.reset_for_plan();
        assert_eq!(state.status, DriftStatus::Unchecked);
        assert!(state.override_used);

        state.apply(vec![], false).unwrap();
        assert_eq!(state.status, DriftStatus::Clean);
        assert!(state.override_used);
        assert!(state.summary().contains("override used"));
    }

    #[test]
    fn test_reasons_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&DriftReason::HeadChanged).unwrap(),
            "\"head_changed\""
        );
        assert_eq!(
            serde_json::to_string(&DriftStatus::DriftConfirmed).unwrap(),
            "\"DRIFT_CONFIRMED\""
        );
    }
}
