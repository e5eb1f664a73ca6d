//! Handoff of review findings to whoever applies the fixes.
//!
//! Findings from completed agent results are ranked by priority and turned
//! into patch candidates. The raw list keeps the top thirty findings; the
//! deduplicated list merges candidates sharing priority, title and location
//! and records every agent that raised them. Each candidate waits for an
//! explicit user decision, `deferred` until someone says otherwise.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::findings::{Finding, Priority};
use crate::digest::digest_text;

pub const HANDOFF_SCHEMA_VERSION: &str = "2.0";
pub const MAX_RAW_CANDIDATES: usize = 30;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserDecision {
    Approved,
    Rejected,
    #[default]
    Deferred,
}

impl fmt::Display for UserDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Deferred => "deferred",
        };
        write!(f, "{}", s)
    }
}

/// A finding tagged with the agent that reported it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributedFinding {
    pub agent: String,
    #[serde(flatten)]
    pub finding: Finding,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchCandidate {
    pub id: String,
    pub priority: Priority,
    pub source_agent: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub change_summary: String,
    pub status: String,
    pub requires_user_confirmation: bool,
    pub user_decision: UserDecision,
    #[serde(default)]
    pub user_notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupCandidate {
    pub id: String,
    pub priority: Priority,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub change_summary: String,
    pub source_agents: Vec<String>,
    pub status: String,
    pub requires_user_confirmation: bool,
    pub user_decision: UserDecision,
    #[serde(default)]
    pub user_notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRules {
    pub allowed_user_decisions: Vec<UserDecision>,
    pub default: UserDecision,
    pub requires_user_confirmation: bool,
}

impl Default for DecisionRules {
    fn default() -> Self {
        Self {
            allowed_user_decisions: vec![
                UserDecision::Approved,
                UserDecision::Rejected,
                UserDecision::Deferred,
            ],
            default: UserDecision::Deferred,
            requires_user_confirmation: true,
        }
    }
}

/// Result artifact an agent's findings were read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub result: String,
    pub status: String,
    pub findings: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handoff {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_path: Option<String>,
    pub agent_outputs: BTreeMap<String, AgentOutput>,
    pub findings: Vec<AttributedFinding>,
    pub raw_patch_candidates: Vec<PatchCandidate>,
    pub deduplicated_patch_candidates: Vec<DedupCandidate>,
    pub decision_rules: DecisionRules,
    pub next_step: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationEntry {
    pub patch_id: String,
    pub user_decision: UserDecision,
    #[serde(default)]
    pub user_notes: String,
    #[serde(default)]
    pub approved_by: String,
    #[serde(default)]
    pub approved_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub run_id: String,
    pub decisions: Vec<ConfirmationEntry>,
}

/// Findings of one agent as read from its result artifact.
pub struct AgentFindings {
    pub agent: String,
    pub result_key: String,
    /// `completed`, or why the findings are absent.
    pub status: String,
    pub findings: Vec<Finding>,
}

pub fn build_handoff(run_id: &str, plan_path: Option<String>, agents: Vec<AgentFindings>) -> Handoff {
    let mut agent_outputs = BTreeMap::new();
    let mut findings = Vec::new();
    for agent in agents {
        agent_outputs.insert(
            agent.agent.clone(),
            AgentOutput {
                result: agent.result_key,
                status: agent.status,
                findings: agent.findings.len(),
            },
        );
        findings.extend(agent.findings.into_iter().map(|finding| AttributedFinding {
            agent: agent.agent.clone(),
            finding,
        }));
    }
    // Stable: equal priorities keep agent order.
    findings.sort_by_key(|f| f.finding.priority);

    let raw: Vec<PatchCandidate> = findings
        .iter()
        .take(MAX_RAW_CANDIDATES)
        .enumerate()
        .map(|(idx, f)| PatchCandidate {
            id: format!("patch-{}", idx + 1),
            priority: f.finding.priority,
            source_agent: f.agent.clone(),
            title: f.finding.title.clone(),
            location: f.finding.location.as_ref().map(|l| l.to_string()),
            change_summary: summary_of(&f.finding),
            status: "proposed".to_string(),
            requires_user_confirmation: true,
            user_decision: UserDecision::Deferred,
            user_notes: String::new(),
        })
        .collect();

    let deduplicated = deduplicate(&raw);

    Handoff {
        schema_version: HANDOFF_SCHEMA_VERSION.to_string(),
        generated_at: Utc::now(),
        run_id: run_id.to_string(),
        plan_path,
        agent_outputs,
        findings,
        raw_patch_candidates: raw,
        deduplicated_patch_candidates: deduplicated,
        decision_rules: DecisionRules::default(),
        next_step: "Present deduplicated_patch_candidates to the user, record a user_decision \
                    per patch in patch-confirmation.json, and apply only approved patches."
            .to_string(),
    }
}

fn summary_of(finding: &Finding) -> String {
    if finding.description.trim().is_empty() {
        finding.title.clone()
    } else {
        finding.description.trim().to_string()
    }
}

/// Id of a deduplicated candidate, derived from its dedup key so recorded
/// decisions stay attached to the same patch when the ranking changes.
pub fn dedup_id(priority: Priority, title: &str, location: Option<&str>) -> String {
    let key = format!(
        "{}|{}|{}",
        priority,
        title.trim().to_lowercase(),
        location.unwrap_or_default()
    );
    format!("patch-{}", digest_text(&key))
}

/// Merge candidates sharing (priority, title, location), keeping first-seen
/// order within each priority.
fn deduplicate(raw: &[PatchCandidate]) -> Vec<DedupCandidate> {
    let mut out: Vec<DedupCandidate> = Vec::new();
    for p in raw {
        let existing = out.iter_mut().find(|d| {
            d.priority == p.priority
                && d.title.eq_ignore_ascii_case(&p.title)
                && d.location == p.location
        });
        match existing {
            Some(d) => {
                if !d.source_agents.contains(&p.source_agent) {
                    d.source_agents.push(p.source_agent.clone());
                }
            }
            None => out.push(DedupCandidate {
                id: dedup_id(p.priority, &p.title, p.location.as_deref()),
                priority: p.priority,
                title: p.title.clone(),
                location: p.location.clone(),
                change_summary: p.change_summary.clone(),
                source_agents: vec![p.source_agent.clone()],
                status: "proposed".to_string(),
                requires_user_confirmation: true,
                user_decision: UserDecision::Deferred,
                user_notes: String::new(),
            }),
        }
    }
    out.sort_by_key(|d| d.priority);
    out
}

impl Handoff {
    /// One deferred decision per deduplicated candidate.
    pub fn confirmation_template(&self) -> Confirmation {
        Confirmation {
            run_id: self.run_id.clone(),
            decisions: self
                .deduplicated_patch_candidates
                .iter()
                .map(|p| ConfirmationEntry {
                    patch_id: p.id.clone(),
                    user_decision: self.decision_rules.default,
                    user_notes: String::new(),
                    approved_by: String::new(),
                    approved_at: String::new(),
                })
                .collect(),
        }
    }
}
