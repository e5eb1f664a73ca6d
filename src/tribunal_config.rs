//! File-level configuration read from `.tribunal/tribunal.toml`.
//!
//! Every section is optional; missing keys fall back to built-in defaults.
//!
//! ```toml
//! [review]
//! max_participants = 10
//! timeout_secs = 1800
//! coverage_threshold = 80.0
//!
//! [plans]
//! roots = ["docs/plans/**/*.md", "plans/**/*.md"]
//! allowlist = "docs/approved-plans"
//!
//! [participants]
//! agents = ["logic", "code-quality"]
//! optional_agents = ["silent-failure"]
//!
//! [[participants.tools]]
//! name = "ruff"
//! extensions = ["py"]
//! required = true
//! rationale = "Python sources changed"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_FILE: &str = "tribunal.toml";

/// Default plan discovery locations, searched in order.
pub const DEFAULT_PLAN_ROOTS: &[&str] = &[
    "docs/plans/**/*.md",
    "plans/**/*.md",
    ".tribunal/plans/**/*.md",
    ".claude/plans/**/*.md",
];

/// Review-wide limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSection {
    #[serde(default = "default_max_participants")]
    pub max_participants: usize,
    /// Reviewer timeout written into request artifacts. Never enforced.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Minimum line coverage (percent) for the test-runner gate.
    #[serde(default = "default_coverage_threshold")]
    pub coverage_threshold: f64,
}

fn default_max_participants() -> usize {
    10
}

fn default_timeout_secs() -> u64 {
    1800
}

fn default_coverage_threshold() -> f64 {
    80.0
}

impl Default for ReviewSection {
    fn default() -> Self {
        Self {
            max_participants: default_max_participants(),
            timeout_secs: default_timeout_secs(),
            coverage_threshold: default_coverage_threshold(),
        }
    }
}

/// Where plan documents are discovered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlansSection {
    #[serde(default = "default_plan_roots")]
    pub roots: Vec<String>,
    /// Privileged plan directory; candidates from it receive a score boost.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowlist: Option<String>,
}

fn default_plan_roots() -> Vec<String> {
    DEFAULT_PLAN_ROOTS.iter().map(|s| s.to_string()).collect()
}

impl Default for PlansSection {
    fn default() -> Self {
        Self {
            roots: default_plan_roots(),
            allowlist: None,
        }
    }
}

/// A static tool that joins the review when matching files change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRule {
    pub name: String,
    /// File extensions (without the dot) that activate the tool.
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub rationale: String,
}

impl ToolRule {
    fn new(name: &str, extensions: &[&str], required: bool, rationale: &str) -> Self {
        Self {
            name: name.to_string(),
            extensions: extensions.iter().map(|s| s.to_string()).collect(),
            required,
            rationale: rationale.to_string(),
        }
    }

    /// Whether any of `files` activates this tool.
    pub fn matches_any(&self, files: &[String]) -> bool {
        files.iter().any(|file| {
            Path::new(file)
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
        })
    }
}

/// Default participant roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantsSection {
    #[serde(default = "default_agents")]
    pub agents: Vec<String>,
    #[serde(default)]
    pub optional_agents: Vec<String>,
    #[serde(default = "default_tools")]
    pub tools: Vec<ToolRule>,
}

fn default_agents() -> Vec<String> {
    ["logic", "code-quality", "silent-failure"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_tools() -> Vec<ToolRule> {
    vec![
        ToolRule::new("ruff", &["py"], true, "Python sources changed: lint gate"),
        ToolRule::new("mypy", &["py", "pyi"], false, "Python sources changed: type check"),
        ToolRule::new("pytest", &["py"], true, "Python sources changed: tests and coverage"),
        ToolRule::new(
            "eslint",
            &["js", "jsx", "ts", "tsx"],
            true,
            "JavaScript/TypeScript sources changed: lint gate",
        ),
        ToolRule::new("tsc", &["ts", "tsx"], false, "TypeScript sources changed: type check"),
    ]
}

impl Default for ParticipantsSection {
    fn default() -> Self {
        Self {
            agents: default_agents(),
            optional_agents: vec!["testing-static".to_string()],
            tools: default_tools(),
        }
    }
}

/// The complete tribunal.toml structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TribunalToml {
    #[serde(default)]
    pub review: ReviewSection,
    #[serde(default)]
    pub plans: PlansSection,
    #[serde(default)]
    pub participants: ParticipantsSection,
}

impl TribunalToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse tribunal.toml")
    }

    /// Load from `<state_dir>/tribunal.toml`, or defaults when absent.
    pub fn load_or_default(state_dir: &Path) -> Result<Self> {
        let path = state_dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize tribunal.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.review.max_participants == 0 {
            warnings.push("max_participants is 0: no requests can be emitted".to_string());
        }
        if !(0.0..=100.0).contains(&self.review.coverage_threshold) {
            warnings.push(format!(
                "coverage_threshold {} is outside 0-100",
                self.review.coverage_threshold
            ));
        }
        for tool in &self.participants.tools {
            if tool.extensions.is_empty() {
                warnings.push(format!("Tool '{}' has no extensions and never activates", tool.name));
            }
        }
        warnings
    }
}
