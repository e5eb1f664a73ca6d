//! Artifact key layout under the state directory.
//!
//! ```text
//! .tribunal/
//! ├── current                       # id of the current run
//! ├── tribunal.toml                 # optional configuration
//! ├── logs/
//! └── runs/<id>/
//!     ├── run.json
//!     ├── context.md, diff.patch
//!     ├── plan.md, plan.json
//!     ├── requests/<participant>.md
//!     ├── status/<participant>.json
//!     ├── reports/<participant>.md|.txt
//!     ├── results/<participant>.json
//!     ├── verdict.md, verdict.json
//!     └── handoff.json, patch-confirmation.json
//! ```

use anyhow::Result;
use regex::Regex;
use std::sync::LazyLock;

use crate::errors::ReviewError;

pub const CURRENT_KEY: &str = "current";

static PARTICIPANT_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,63}$").unwrap());

/// Reject names that cannot be used as artifact keys.
pub fn validate_participant_name(name: &str) -> Result<()> {
    if PARTICIPANT_NAME_REGEX.is_match(name) && !name.contains("..") {
        Ok(())
    } else {
        Err(ReviewError::precondition(format!(
            "Invalid participant name '{}': use letters, digits, '.', '_' or '-'",
            name
        ))
        .into())
    }
}

pub fn run_dir(run_id: &str) -> String {
    format!("runs/{}/", run_id)
}

pub fn run_key(run_id: &str) -> String {
    format!("runs/{}/run.json", run_id)
}

pub fn context_key(run_id: &str) -> String {
    format!("runs/{}/context.md", run_id)
}

pub fn diff_key(run_id: &str) -> String {
    format!("runs/{}/diff.patch", run_id)
}

pub fn plan_doc_key(run_id: &str) -> String {
    format!("runs/{}/plan.md", run_id)
}

pub fn plan_summary_key(run_id: &str) -> String {
    format!("runs/{}/plan.json", run_id)
}

pub fn requests_prefix(run_id: &str) -> String {
    format!("runs/{}/requests/", run_id)
}

pub fn request_key(run_id: &str, participant: &str) -> String {
    format!("runs/{}/requests/{}.md", run_id, participant)
}

pub fn status_prefix(run_id: &str) -> String {
    format!("runs/{}/status/", run_id)
}

pub fn status_key(run_id: &str, participant: &str) -> String {
    format!("runs/{}/status/{}.json", run_id, participant)
}

/// Raw submission. Agents submit Markdown, tools raw text output.
pub fn report_key(run_id: &str, participant: &str, is_agent: bool) -> String {
    let ext = if is_agent { "md" } else { "txt" };
    format!("runs/{}/reports/{}.{}", run_id, participant, ext)
}

pub fn result_key(run_id: &str, participant: &str) -> String {
    format!("runs/{}/results/{}.json", run_id, participant)
}

pub fn verdict_md_key(run_id: &str) -> String {
    format!("runs/{}/verdict.md", run_id)
}

pub fn verdict_json_key(run_id: &str) -> String {
    format!("runs/{}/verdict.json", run_id)
}

pub fn handoff_key(run_id: &str) -> String {
    format!("runs/{}/handoff.json", run_id)
}

pub fn confirmation_key(run_id: &str) -> String {
    format!("runs/{}/patch-confirmation.json", run_id)
}

/// Participant name from a `requests/<name>.md` or `status/<name>.json` key.
pub fn participant_from_key(key: &str) -> Option<String> {
    let file = key.rsplit('/').next()?;
    let (stem, _) = file.rsplit_once('.')?;
    (!stem.is_empty()).then(|| stem.to_string())
}
