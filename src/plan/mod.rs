//! Review plan: which participants take part and why.
//!
//! The plan step resolves the SSOT plan document (see [`resolver`]), reads
//! its optional YAML front matter, and fixes the required/optional
//! participant lists into a [`PlanDocument`] persisted as `plan.json` and
//! rendered as `plan.md`.
//!
//! Front matter, when present, overrides the configured roster:
//!
//! ```text
//! ---
//! agents: [logic, security]
//! optional_agents: [testing-static]
//! max_participants: 6
//! tools:
//!   - name: ruff
//!     extensions: [py]
//!     required: true
//! ---
//! ```

pub mod resolver;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::config::Config;
use crate::errors::ReviewError;
use crate::layout;
use crate::review::participants::Category;
use crate::tribunal_config::ToolRule;
use resolver::{PlanSource, PlanStatus, Resolution};

pub const PLAN_SCHEMA_VERSION: u32 = 1;

/// Participant roster declared in a plan's front matter.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PlanFrontMatter {
    #[serde(default)]
    pub agents: Option<Vec<String>>,
    #[serde(default)]
    pub optional_agents: Option<Vec<String>>,
    #[serde(default)]
    pub tools: Option<Vec<ToolRule>>,
    #[serde(default)]
    pub max_participants: Option<usize>,
}

impl PlanFrontMatter {
    /// Parse the leading `---` block of a Markdown document, if any.
    pub fn parse(markdown: &str) -> Result<Option<Self>> {
        let Some(rest) = markdown
            .strip_prefix("---\n")
            .or_else(|| markdown.strip_prefix("---\r\n"))
        else {
            return Ok(None);
        };
        let Some(end) = rest.find("\n---") else {
            return Ok(None);
        };
        let yaml = &rest[..end];
        if yaml.trim().is_empty() {
            return Ok(Some(Self::default()));
        }
        let parsed: Self = serde_yaml::from_str(yaml).context("Invalid plan front matter")?;
        Ok(Some(parsed))
    }
}

/// One planned participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedParticipant {
    pub name: String,
    pub category: Category,
    pub required: bool,
    #[serde(default)]
    pub rationale: String,
}

/// The fixed participant plan of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDocument {
    pub schema_version: u32,
    pub run_id: String,
    pub resolution: Resolution,
    /// Ordered: required agents, required tools, optional agents, optional tools.
    pub participants: Vec<PlannedParticipant>,
    pub max_participants: usize,
    /// Reviewer timeout, metadata only.
    pub timeout_secs: u64,
    #[serde(default)]
    pub changed_files: Vec<String>,
    /// Optional participants dropped to respect the limit.
    #[serde(default)]
    pub dropped: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl PlanDocument {
    /// Build the plan from configuration, the resolved SSOT plan's front
    /// matter and the files the review touches.
    pub fn build(
        run_id: &str,
        config: &Config,
        resolution: Resolution,
        front_matter: Option<&PlanFrontMatter>,
        changed_files: Vec<String>,
    ) -> Result<Self> {
        let fm = front_matter.cloned().unwrap_or_default();
        let agents = fm.agents.unwrap_or_else(|| config.agents.clone());
        let optional_agents = fm
            .optional_agents
            .unwrap_or_else(|| config.optional_agents.clone());
        let tools = fm.tools.unwrap_or_else(|| config.tools.clone());
        let max_participants = fm.max_participants.unwrap_or(config.max_participants);

        let mut required = Vec::new();
        let mut optional = Vec::new();

        for name in &agents {
            push_unique(&mut required, &optional, PlannedParticipant {
                name: name.clone(),
                category: Category::Agent,
                required: true,
                rationale: "core reviewer".to_string(),
            });
        }
        for rule in tools.iter().filter(|t| t.matches_any(&changed_files)) {
            let participant = PlannedParticipant {
                name: rule.name.clone(),
                category: Category::StaticTool,
                required: rule.required,
                rationale: if rule.rationale.is_empty() {
                    format!("files matching {} changed", rule.extensions.join("/"))
                } else {
                    rule.rationale.clone()
                },
            };
            if rule.required {
                push_unique(&mut required, &optional, participant);
            } else {
                push_unique(&mut optional, &required, participant);
            }
        }
        for name in &optional_agents {
            push_unique(&mut optional, &required, PlannedParticipant {
                name: name.clone(),
                category: Category::Agent,
                required: false,
                rationale: "optional reviewer".to_string(),
            });
        }

        for p in required.iter().chain(&optional) {
            layout::validate_participant_name(&p.name)?;
        }

        if required.len() > max_participants {
            return Err(ReviewError::precondition(format!(
                "{} required participants exceed the limit of {}",
                required.len(),
                max_participants
            ))
            .into());
        }

        // Optional participants fill the remaining slots in order.
        let room = max_participants - required.len();
        let dropped: Vec<String> = optional.iter().skip(room).map(|p| p.name.clone()).collect();
        optional.truncate(room);
        if !dropped.is_empty() {
            tracing::warn!(?dropped, "optional participants dropped by max_participants");
        }

        let mut participants = required;
        participants.extend(optional);

        Ok(Self {
            schema_version: PLAN_SCHEMA_VERSION,
            run_id: run_id.to_string(),
            resolution,
            participants,
            max_participants,
            timeout_secs: config.timeout_secs,
            changed_files,
            dropped,
            created_at: Utc::now(),
        })
    }

    pub fn required(&self) -> impl Iterator<Item = &PlannedParticipant> {
        self.participants.iter().filter(|p| p.required)
    }

    pub fn optional(&self) -> impl Iterator<Item = &PlannedParticipant> {
        self.participants.iter().filter(|p| !p.required)
    }

    pub fn get(&self, name: &str) -> Option<&PlannedParticipant> {
        self.participants.iter().find(|p| p.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn required_names(&self) -> Vec<String> {
        self.required().map(|p| p.name.clone()).collect()
    }

    /// Validate a persisted plan.
    pub fn parse(key: &str, raw: &str) -> Result<Self> {
        let plan: Self = serde_json::from_str(raw)
            .map_err(|e| ReviewError::corrupt(key, e.to_string()))?;
        if plan.schema_version != PLAN_SCHEMA_VERSION {
            return Err(ReviewError::corrupt(
                key,
                format!("unsupported schema_version {}", plan.schema_version),
            )
            .into());
        }
        Ok(plan)
    }

    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        let _ = writeln!(md, "# Review Plan: {}\n", self.run_id);

        let _ = writeln!(md, "## SSOT Plan\n");
        let _ = writeln!(md, "- Status: {}", self.resolution.status);
        if let Some(ref path) = self.resolution.path {
            let source = match self.resolution.source {
                PlanSource::Explicit => "explicit",
                PlanSource::Resolved => "resolved",
            };
            let _ = writeln!(md, "- Path: `{}` ({})", path, source);
        }
        if self.resolution.status == PlanStatus::Ambiguous {
            let _ = writeln!(md, "- Candidates:");
            for c in &self.resolution.candidates {
                let _ = writeln!(md, "  - `{}` (score {})", c.path, c.score);
            }
        }
        if !self.resolution.identifiers.is_empty() {
            let _ = writeln!(md, "- Identifiers: {}", self.resolution.identifiers.join(", "));
        }

        let _ = writeln!(md, "\n## Participants\n");
        let _ = writeln!(md, "| Participant | Category | Required | Rationale |");
        let _ = writeln!(md, "|---|---|---|---|");
        for p in &self.participants {
            let _ = writeln!(
                md,
                "| {} | {} | {} | {} |",
                p.name,
                p.category,
                if p.required { "yes" } else { "no" },
                p.rationale
            );
        }
        if !self.dropped.is_empty() {
            let _ = writeln!(md, "\nDropped (limit {}): {}", self.max_participants, self.dropped.join(", "));
        }

        let _ = writeln!(md, "\n## Limits\n");
        let _ = writeln!(md, "- Max participants: {}", self.max_participants);
        let _ = writeln!(md, "- Reviewer timeout: {}s (not enforced)", self.timeout_secs);
        let _ = writeln!(md, "- Changed files: {}", self.changed_files.len());
        md
    }
}

fn push_unique(
    target: &mut Vec<PlannedParticipant>,
    other: &[PlannedParticipant],
    participant: PlannedParticipant,
) {
    if target.iter().chain(other).any(|p| p.name == participant.name) {
        tracing::debug!(name = %participant.name, "duplicate participant ignored");
        return;
    }
    target.push(participant);
}
