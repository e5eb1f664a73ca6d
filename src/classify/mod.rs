//! Static tool output classification.
//!
//! Each tool's raw console output is reduced to a [`ToolSummary`]. Every
//! classifier applies the same rule order:
//!
//! 1. skip phrase → SKIP
//! 2. success phrase → PASS with zero issues
//! 3. numeric issue count or rule-citation lines → FAIL (at least one issue)
//! 4. empty output → PASS
//! 5. anything else → UNKNOWN
//!
//! When the caller knows the process exit code, [`Classifier::classify_with_exit`]
//! refuses to read empty output from a failing process as a pass.

mod pattern;
mod rule_code;
mod test_runner;

pub use pattern::PatternClassifier;
pub use rule_code::RuleCodeClassifier;
pub use test_runner::TestRunnerClassifier;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classified outcome of a tool run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolStatus {
    Pass,
    Fail,
    Skip,
    Unknown,
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Skip => "SKIP",
            Self::Unknown => "UNKNOWN",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSummary {
    pub status: ToolStatus,
    pub reason: String,
    pub issues: u32,
}

impl ToolSummary {
    pub fn new(status: ToolStatus, reason: impl Into<String>, issues: u32) -> Self {
        Self {
            status,
            reason: reason.into(),
            issues,
        }
    }

    pub fn pass(reason: impl Into<String>) -> Self {
        Self::new(ToolStatus::Pass, reason, 0)
    }

    pub fn skip(reason: impl Into<String>) -> Self {
        Self::new(ToolStatus::Skip, reason, 0)
    }

    /// FAIL with at least one issue, whatever count was parsed.
    pub fn fail(reason: impl Into<String>, issues: u32) -> Self {
        Self::new(ToolStatus::Fail, reason, issues.max(1))
    }

    pub fn unknown(reason: impl Into<String>) -> Self {
        Self::new(ToolStatus::Unknown, reason, 0)
    }

    pub fn empty_output() -> Self {
        Self::pass("no output")
    }
}

/// Reduces a tool's raw output to a [`ToolSummary`].
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    fn classify(&self, output: &str) -> ToolSummary;

    /// Classify with the process exit code when it is known.
    fn classify_with_exit(&self, output: &str, exit_code: Option<i32>) -> ToolSummary {
        if output.trim().is_empty()
            && let Some(code) = exit_code
            && code != 0
        {
            return ToolSummary::unknown(format!("no output but exit code {}", code));
        }
        self.classify(output)
    }
}

/// Tool names with a dedicated classifier.
pub const BUILTIN_TOOLS: &[&str] = &["eslint", "tsc", "mypy", "ruff", "pytest"];

/// Look up the classifier for `tool`, falling back to the generic one.
pub fn classifier_for(tool: &str, coverage_threshold: f64) -> Box<dyn Classifier> {
    match tool.to_ascii_lowercase().as_str() {
        "eslint" => Box::new(PatternClassifier::eslint()),
        "tsc" => Box::new(PatternClassifier::tsc()),
        "mypy" => Box::new(PatternClassifier::mypy()),
        "ruff" => Box::new(RuleCodeClassifier::ruff()),
        "pytest" => Box::new(TestRunnerClassifier::pytest(coverage_threshold)),
        _ => Box::new(PatternClassifier::generic(tool)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_names() {
        for tool in BUILTIN_TOOLS {
            assert_eq!(classifier_for(tool, 80.0).name(), *tool);
        }
        assert_eq!(classifier_for("ESLint", 80.0).name(), "eslint");
        assert_eq!(classifier_for("shellcheck", 80.0).name(), "shellcheck");
    }

    #[test]
    fn test_found_errors_fails_with_count() {
        for tool in ["eslint", "ruff", "tsc", "mypy", "shellcheck"] {
            let summary = classifier_for(tool, 80.0).classify("Found 2 errors");
            assert_eq!(summary.status, ToolStatus::Fail, "{}", tool);
            assert_eq!(summary.issues, 2, "{}", tool);
        }
    }

    #[test]
    fn test_empty_output_passes_for_every_tool() {
        for tool in BUILTIN_TOOLS.iter().chain(&["custom"]) {
            let summary = classifier_for(tool, 80.0).classify("  \n");
            assert_eq!(summary.status, ToolStatus::Pass, "{}", tool);
            assert_eq!(summary.issues, 0);
        }
    }

    #[test]
    fn test_empty_output_with_failing_exit_is_unknown() {
        let classifier = classifier_for("eslint", 80.0);
        assert_eq!(
            classifier.classify_with_exit("", Some(2)).status,
            ToolStatus::Unknown
        );
        assert_eq!(
            classifier.classify_with_exit("", Some(0)).status,
            ToolStatus::Pass
        );
        assert_eq!(classifier.classify_with_exit("", None).status, ToolStatus::Pass);
    }

    #[test]
    fn test_fail_never_reports_zero_issues() {
        assert_eq!(ToolSummary::fail("x", 0).issues, 1);
        assert_eq!(ToolSummary::fail("x", 4).issues, 4);
    }
}
