//! Rule-code classifier for linters that cite rule codes (ruff).
//!
//! Each cited code is matched against two prefix lists. The longest
//! matching prefix decides whether it blocks; codes matching neither list
//! block.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use super::{Classifier, ToolSummary};

// `path:line:col: CODE message` (concise format)
static CONCISE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\S+?:\d+:\d+:\s+([A-Z]{1,4}\d{1,4})\b").unwrap());

// `CODE [*] message` followed by a `-->` location (full format)
static FULL_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^([A-Z]{1,4}\d{1,4})(?: \[\*\])? \S").unwrap());

static FOUND_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Found (\d+) errors?").unwrap());

static SKIP_PHRASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)no python files found").unwrap());

static SUCCESS_PHRASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"All checks passed!?").unwrap());

pub struct RuleCodeClassifier {
    name: String,
    blocking: Vec<String>,
    warning: Vec<String>,
}

impl RuleCodeClassifier {
    pub fn new(name: &str, blocking: &[&str], warning: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            blocking: blocking.iter().map(|s| s.to_string()).collect(),
            warning: warning.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Syntax errors, pyflakes, bugbear and bandit block; style families warn.
    pub fn ruff() -> Self {
        Self::new(
            "ruff",
            &["E9", "F", "B", "S", "PLE"],
            &["E", "W", "C", "N", "D", "I", "UP", "SIM", "PL", "RUF"],
        )
    }

    fn longest_prefix(list: &[String], code: &str) -> usize {
        list.iter()
            .filter(|p| code.starts_with(p.as_str()))
            .map(|p| p.len())
            .max()
            .unwrap_or(0)
    }

    pub fn is_blocking(&self, code: &str) -> bool {
        let b = Self::longest_prefix(&self.blocking, code);
        let w = Self::longest_prefix(&self.warning, code);
        b >= w
    }

    fn cited_codes(output: &str) -> Vec<String> {
        let concise: Vec<String> = CONCISE_CODE
            .captures_iter(output)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect();
        if !concise.is_empty() {
            return concise;
        }
        FULL_CODE
            .captures_iter(output)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect()
    }
}

impl Classifier for RuleCodeClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn classify(&self, output: &str) -> ToolSummary {
        if SKIP_PHRASE.is_match(output) {
            return ToolSummary::skip("no Python files found");
        }
        if SUCCESS_PHRASE.is_match(output) {
            return ToolSummary::pass("all checks passed");
        }

        let codes = Self::cited_codes(output);
        if !codes.is_empty() {
            let (blocking, warning): (Vec<&String>, Vec<&String>) =
                codes.iter().partition(|code| self.is_blocking(code));
            if !blocking.is_empty() {
                let distinct: BTreeSet<&str> = blocking.iter().map(|c| c.as_str()).collect();
                let listed: Vec<&str> = distinct.into_iter().collect();
                return ToolSummary::fail(
                    format!("{} blocking violation(s): {}", blocking.len(), listed.join(", ")),
                    blocking.len() as u32,
                );
            }
            let distinct: BTreeSet<&str> = warning.iter().map(|c| c.as_str()).collect();
            let listed: Vec<&str> = distinct.into_iter().collect();
            return ToolSummary::pass(format!(
                "{} warning-only violation(s): {}",
                warning.len(),
                listed.join(", ")
            ));
        }

        if let Some(n) = FOUND_COUNT
            .captures(output)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
            && n > 0
        {
            return ToolSummary::fail(format!("{} error(s) reported", n), n);
        }

        if output.trim().is_empty() {
            return ToolSummary::empty_output();
        }
        ToolSummary::unknown("unrecognized ruff output")
    }
}
