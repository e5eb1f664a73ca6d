use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::errors::ReviewError;
use crate::tribunal_config::{ToolRule, TribunalToml};

/// Name of the state directory inside the project.
pub const STATE_DIR: &str = ".tribunal";

/// Runtime configuration, constructed once per invocation and threaded into
/// every component.
///
/// Layering: built-in defaults → `.tribunal/tribunal.toml` → environment
/// (including `.env`). The CLI contributes only the project directory and
/// `--verbose`; review settings have no flags.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub state_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Ordered glob patterns (relative to `project_dir`) for plan discovery.
    pub plan_roots: Vec<String>,
    /// Privileged plan directory (relative to `project_dir` or absolute).
    pub plan_allowlist: Option<PathBuf>,
    pub coverage_threshold: f64,
    pub max_participants: usize,
    pub timeout_secs: u64,
    pub agents: Vec<String>,
    pub optional_agents: Vec<String>,
    pub tools: Vec<ToolRule>,
    pub verbose: bool,
}

impl Config {
    /// Load configuration for `project_dir` using the process environment.
    pub fn load(project_dir: PathBuf, verbose: bool) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        // A missing .env file is not an error.
        let _ = dotenvy::from_path(project_dir.join(".env"));
        Self::from_sources(project_dir, verbose, |key| std::env::var(key).ok())
    }

    /// Build configuration from explicit sources. `env` resolves variables,
    /// which keeps tests free of process-global mutation.
    pub fn from_sources(
        project_dir: PathBuf,
        verbose: bool,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let state_dir = project_dir.join(STATE_DIR);
        let toml = TribunalToml::load_or_default(&state_dir)?;
        for warning in toml.validate() {
            tracing::warn!("{}", warning);
        }

        let mut config = Self {
            log_dir: state_dir.join("logs"),
            state_dir,
            plan_roots: toml.plans.roots.clone(),
            plan_allowlist: toml.plans.allowlist.as_ref().map(PathBuf::from),
            coverage_threshold: toml.review.coverage_threshold,
            max_participants: toml.review.max_participants,
            timeout_secs: toml.review.timeout_secs,
            agents: toml.participants.agents.clone(),
            optional_agents: toml.participants.optional_agents.clone(),
            tools: toml.participants.tools.clone(),
            project_dir,
            verbose,
        };

        if let Some(value) = env("TRIBUNAL_COVERAGE_THRESHOLD") {
            config.coverage_threshold = parse_env("TRIBUNAL_COVERAGE_THRESHOLD", &value)?;
        }
        if let Some(value) = env("TRIBUNAL_MAX_PARTICIPANTS") {
            config.max_participants = parse_env("TRIBUNAL_MAX_PARTICIPANTS", &value)?;
        }
        if let Some(value) = env("TRIBUNAL_TIMEOUT_SECS") {
            config.timeout_secs = parse_env("TRIBUNAL_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = env("TRIBUNAL_PLAN_ROOTS") {
            let roots: Vec<String> = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if roots.is_empty() {
                return Err(ReviewError::Config(
                    "TRIBUNAL_PLAN_ROOTS is set but lists no patterns".to_string(),
                )
                .into());
            }
            config.plan_roots = roots;
        }
        if let Some(value) = env("TRIBUNAL_PLAN_ALLOWLIST")
            && !value.trim().is_empty()
        {
            config.plan_allowlist = Some(PathBuf::from(value.trim()));
        }

        Ok(config)
    }

    /// Absolute path of the allow-listed plan directory, if configured.
    pub fn allowlist_dir(&self) -> Option<PathBuf> {
        self.plan_allowlist.as_ref().map(|dir| {
            if dir.is_absolute() {
                dir.clone()
            } else {
                self.project_dir.join(dir)
            }
        })
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.state_dir).context("Failed to create state directory")?;
        std::fs::create_dir_all(&self.log_dir).context("Failed to create log directory")?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.state_dir.exists()
    }

    /// Make `path` relative to the project root for display and persistence.
    pub fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.project_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ReviewError::Config(format!("{} has an invalid value '{}'", key, value)).into())
}
