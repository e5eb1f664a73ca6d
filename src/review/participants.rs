//! Per-participant status records.
//!
//! Each participant has one `status/<name>.json` artifact. Records carry a
//! `schema_version` and are validated on every read, not merely parsed: a
//! record that fails validation surfaces as [`StatusRecord::Corrupt`], which
//! callers report as a warning and count as missing for gating.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::contract::ValidationResult;
use super::findings::PriorityCounts;
use crate::classify::{ToolStatus, ToolSummary};
use crate::layout;
use crate::store::{ArtifactStore, put_json};

pub const STATUS_SCHEMA_VERSION: u32 = 1;

/// What kind of reviewer a participant is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Agent,
    StaticTool,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agent => write!(f, "agent"),
            Self::StaticTool => write!(f, "static-tool"),
        }
    }
}

/// Lifecycle state of a participant.
///
/// Agents move PENDING → DONE | INVALID. Static tools move PENDING → PASS |
/// FAIL | SKIP | UNKNOWN, or INVALID when the submission could not be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantState {
    Pending,
    Done,
    Invalid,
    Pass,
    Fail,
    Skip,
    Unknown,
}

impl ParticipantState {
    pub fn allowed_for(&self, category: Category) -> bool {
        match category {
            Category::Agent => matches!(self, Self::Pending | Self::Done | Self::Invalid),
            Category::StaticTool => !matches!(self, Self::Done),
        }
    }
}

impl From<ToolStatus> for ParticipantState {
    fn from(status: ToolStatus) -> Self {
        match status {
            ToolStatus::Pass => Self::Pass,
            ToolStatus::Fail => Self::Fail,
            ToolStatus::Skip => Self::Skip,
            ToolStatus::Unknown => Self::Unknown,
        }
    }
}

impl fmt::Display for ParticipantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Done => "DONE",
            Self::Invalid => "INVALID",
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Skip => "SKIP",
            Self::Unknown => "UNKNOWN",
        };
        write!(f, "{}", s)
    }
}

/// Condensed contract-validation outcome kept on the status record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub counts: PriorityCounts,
}

impl From<&ValidationResult> for ValidationOutcome {
    fn from(result: &ValidationResult) -> Self {
        Self {
            valid: result.valid,
            errors: result.errors.clone(),
            warnings: result.warnings.clone(),
            counts: result.counts,
        }
    }
}

/// Persisted status of one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantStatus {
    pub schema_version: u32,
    pub name: String,
    pub category: Category,
    pub state: ParticipantState,
    /// Digest of the most recent submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationOutcome>,
    /// Classifier output for static tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<ToolSummary>,
    /// Out-of-plan submission.
    #[serde(default)]
    pub is_extra: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
}

impl ParticipantStatus {
    pub fn pending(name: impl Into<String>, category: Category) -> Self {
        let now = Utc::now();
        Self {
            schema_version: STATUS_SCHEMA_VERSION,
            name: name.into(),
            category,
            state: ParticipantState::Pending,
            submission_hash: None,
            validation: None,
            tool: None,
            is_extra: false,
            created_at: now,
            updated_at: now,
            submitted_at: None,
        }
    }

    /// Record a validated agent report.
    pub fn record_report(&mut self, hash: String, result: &ValidationResult) {
        self.state = if result.valid {
            ParticipantState::Done
        } else {
            ParticipantState::Invalid
        };
        self.validation = Some(ValidationOutcome::from(result));
        self.tool = None;
        self.touch_submission(hash);
    }

    /// Record classified static-tool output.
    pub fn record_tool_output(&mut self, hash: String, summary: ToolSummary) {
        self.state = summary.status.into();
        self.tool = Some(summary);
        self.validation = None;
        self.touch_submission(hash);
    }

    fn touch_submission(&mut self, hash: String) {
        let now = Utc::now();
        self.submission_hash = Some(hash);
        self.submitted_at = Some(now);
        self.updated_at = now;
    }

    /// A submission counts toward completion iff it was accepted and, for
    /// agents, its report passed validation.
    pub fn is_complete(&self) -> bool {
        match self.category {
            Category::Agent => {
                self.state == ParticipantState::Done
                    && self.validation.as_ref().is_some_and(|v| v.valid)
            }
            Category::StaticTool => matches!(
                self.state,
                ParticipantState::Pass | ParticipantState::Fail | ParticipantState::Skip
            ),
        }
    }

    /// Submitted but unusable: INVALID, or a tool whose output could not be
    /// classified.
    pub fn is_invalid(&self) -> bool {
        matches!(self.state, ParticipantState::Invalid | ParticipantState::Unknown)
            || (self.state == ParticipantState::Done && !self.is_complete())
    }

    /// Structural checks beyond deserialization.
    pub fn check(&self, expected_name: &str) -> std::result::Result<(), String> {
        if self.schema_version != STATUS_SCHEMA_VERSION {
            return Err(format!(
                "unsupported schema_version {} (expected {})",
                self.schema_version, STATUS_SCHEMA_VERSION
            ));
        }
        if self.name != expected_name {
            return Err(format!(
                "record names '{}' but is stored as '{}'",
                self.name, expected_name
            ));
        }
        if !self.state.allowed_for(self.category) {
            return Err(format!(
                "state {} is not valid for a {}",
                self.state, self.category
            ));
        }
        if self.state == ParticipantState::Done && self.validation.is_none() {
            return Err("DONE without a validation outcome".to_string());
        }
        if self.state != ParticipantState::Pending && self.submission_hash.is_none() {
            return Err(format!("state {} without a submission hash", self.state));
        }
        if self.updated_at < self.created_at {
            return Err("updated_at precedes created_at".to_string());
        }
        Ok(())
    }
}

/// Result of reading a status artifact.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusRecord {
    Missing,
    Corrupt { reason: String },
    Present(ParticipantStatus),
}

impl StatusRecord {
    pub fn status(&self) -> Option<&ParticipantStatus> {
        match self {
            Self::Present(status) => Some(status),
            _ => None,
        }
    }

    /// Label for tables: the state, CORRUPT, or MISSING.
    pub fn label(&self) -> String {
        match self {
            Self::Missing => "MISSING".to_string(),
            Self::Corrupt { .. } => "CORRUPT".to_string(),
            Self::Present(status) => status.state.to_string(),
        }
    }
}

/// Parse and validate the raw JSON of a status artifact.
pub fn parse_status(name: &str, raw: &str) -> StatusRecord {
    let status: ParticipantStatus = match serde_json::from_str(raw) {
        Ok(status) => status,
        Err(e) => {
            return StatusRecord::Corrupt {
                reason: e.to_string(),
            };
        }
    };
    match status.check(name) {
        Ok(()) => StatusRecord::Present(status),
        Err(reason) => StatusRecord::Corrupt { reason },
    }
}

pub fn load_status(store: &dyn ArtifactStore, run_id: &str, name: &str) -> Result<StatusRecord> {
    let key = layout::status_key(run_id, name);
    let record = match store.get(&key)? {
        None => StatusRecord::Missing,
        Some(raw) => parse_status(name, &raw),
    };
    if let StatusRecord::Corrupt { ref reason } = record {
        tracing::warn!(participant = name, %reason, "corrupt status record counted as missing");
    }
    Ok(record)
}

pub fn save_status(store: &dyn ArtifactStore, run_id: &str, status: &ParticipantStatus) -> Result<()> {
    put_json(store, &layout::status_key(run_id, &status.name), status)
}

/// Every status record of a run, by participant name.
pub fn list_statuses(store: &dyn ArtifactStore, run_id: &str) -> Result<Vec<(String, StatusRecord)>> {
    let mut out = Vec::new();
    for key in store.list(&layout::status_prefix(run_id))? {
        if !key.ends_with(".json") {
            continue;
        }
        if let Some(name) = layout::participant_from_key(&key) {
            let record = load_status(store, run_id, &name)?;
            out.push((name, record));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::contract::validate_report;
    use crate::store::MemoryStore;

    const GOOD_REPORT: &str = "## Summary\nok\n## P2 Findings\n### P2-1: nit\nLocation: a.rs:1\n## Test Plan\nx\n## Confidence\nhigh\n## Verdict\nPASS\n";

    #[test]
    fn test_agent_report_lifecycle() {
        let mut status = ParticipantStatus::pending("logic", Category::Agent);
        assert!(!status.is_complete());
        assert!(status.check("logic").is_ok());

        status.record_report("abc".into(), &validate_report(GOOD_REPORT));
        assert_eq!(status.state, ParticipantState::Done);
        assert!(status.is_complete());
        assert!(!status.is_invalid());

        status.record_report("def".into(), &validate_report("no headings at all"));
        assert_eq!(status.state, ParticipantState::Invalid);
        assert!(!status.is_complete());
        assert!(status.is_invalid());
        assert_eq!(status.submission_hash.as_deref(), Some("def"));
    }

    #[test]
    fn test_tool_states() {
        let mut status = ParticipantStatus::pending("ruff", Category::StaticTool);
        status.record_tool_output(
            "h".into(),
            ToolSummary::new(ToolStatus::Unknown, "unrecognized output", 0),
        );
        assert!(status.is_invalid());
        assert!(!status.is_complete());

        status.record_tool_output("h2".into(), ToolSummary::new(ToolStatus::Fail, "2 errors", 2));
        assert!(status.is_complete());
        assert_eq!(status.state, ParticipantState::Fail);
    }

    #[test]
    fn test_roundtrip_through_store() {
        let store = MemoryStore::new();
        let status = ParticipantStatus::pending("logic", Category::Agent);
        save_status(&store, "r1", &status).unwrap();
        assert_eq!(
            load_status(&store, "r1", "logic").unwrap(),
            StatusRecord::Present(status)
        );
        assert_eq!(load_status(&store, "r1", "other").unwrap(), StatusRecord::Missing);
    }

    #[test]
    fn test_malformed_json_is_corrupt() {
        let record = parse_status("logic", "{ not json");
        assert!(matches!(record, StatusRecord::Corrupt { .. }));
        assert_eq!(record.label(), "CORRUPT");
        assert!(record.status().is_none());
    }

    #[test]
    fn test_schema_violations_are_corrupt() {
        let mut status = ParticipantStatus::pending("logic", Category::Agent);
        status.schema_version = 9;
        let raw = serde_json::to_string(&status).unwrap();
        assert!(matches!(parse_status("logic", &raw), StatusRecord::Corrupt { .. }));

        let status = ParticipantStatus::pending("logic", Category::Agent);
        let raw = serde_json::to_string(&status).unwrap();
        assert!(matches!(parse_status("renamed", &raw), StatusRecord::Corrupt { .. }));

        let mut status = ParticipantStatus::pending("logic", Category::Agent);
        status.state = ParticipantState::Pass;
        status.submission_hash = Some("x".into());
        let raw = serde_json::to_string(&status).unwrap();
        assert!(matches!(parse_status("logic", &raw), StatusRecord::Corrupt { .. }));

        let mut status = ParticipantStatus::pending("logic", Category::Agent);
        status.state = ParticipantState::Done;
        status.submission_hash = Some("x".into());
        let raw = serde_json::to_string(&status).unwrap();
        assert!(matches!(parse_status("logic", &raw), StatusRecord::Corrupt { .. }));
    }

    #[test]
    fn test_list_statuses_includes_corrupt() {
        let store = MemoryStore::new();
        save_status(&store, "r1", &ParticipantStatus::pending("a", Category::Agent)).unwrap();
        store.put(&layout::status_key("r1", "b"), "[]").unwrap();
        let all = list_statuses(&store, "r1").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].0, "a");
        assert!(matches!(all[1].1, StatusRecord::Corrupt { .. }));
    }
}
