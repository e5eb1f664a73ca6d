//! Test-runner classifier: summary counts plus a coverage gate.

use regex::Regex;
use std::sync::LazyLock;

use super::{Classifier, ToolSummary};

// `==== 2 failed, 10 passed, 1 skipped in 3.21s ====`
static SUMMARY_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^=+ (.+?) in [\d.]+s(?: \([^)]*\))? =+\s*$").unwrap());

static SUMMARY_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+) (failed|passed|skipped|errors?|xfailed|xpassed|deselected|warnings?)")
        .unwrap()
});

static NO_TESTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)no tests ran|collected 0 items").unwrap());

// `TOTAL   120   12   90%` or with branch columns `TOTAL 120 12 40 4 88.5%`
static COVERAGE_TOTAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^TOTAL(?:\s+\d+)+\s+(\d+(?:\.\d+)?)%").unwrap());

/// Parsed counts from the final summary line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TestCounts {
    pub passed: u32,
    pub failed: u32,
    pub errors: u32,
    pub skipped: u32,
}

pub struct TestRunnerClassifier {
    name: String,
    coverage_threshold: f64,
}

impl TestRunnerClassifier {
    pub fn pytest(coverage_threshold: f64) -> Self {
        Self {
            name: "pytest".to_string(),
            coverage_threshold,
        }
    }

    /// Counts from the last summary line, if any.
    pub fn parse_counts(output: &str) -> Option<TestCounts> {
        let summary = SUMMARY_LINE.captures_iter(output).last()?;
        let body = summary.get(1)?.as_str();
        let mut counts = TestCounts::default();
        for part in SUMMARY_PART.captures_iter(body) {
            let n: u32 = part[1].parse().unwrap_or(0);
            match &part[2] {
                "passed" | "xpassed" => counts.passed += n,
                "failed" => counts.failed += n,
                "error" | "errors" => counts.errors += n,
                "skipped" | "xfailed" | "deselected" => counts.skipped += n,
                _ => {}
            }
        }
        Some(counts)
    }

    pub fn parse_coverage(output: &str) -> Option<f64> {
        COVERAGE_TOTAL
            .captures_iter(output)
            .last()
            .and_then(|c| c[1].parse::<f64>().ok())
    }
}

impl Classifier for TestRunnerClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn classify(&self, output: &str) -> ToolSummary {
        let counts = Self::parse_counts(output);

        let ran_nothing = counts.is_none_or(|c| c.passed + c.failed + c.errors == 0);
        if ran_nothing && NO_TESTS.is_match(output) {
            return ToolSummary::skip("no tests ran");
        }

        if let Some(counts) = counts {
            let broken = counts.failed + counts.errors;
            if broken > 0 {
                return ToolSummary::fail(
                    format!("{} failed, {} error(s)", counts.failed, counts.errors),
                    broken,
                );
            }
            if counts.passed > 0 || counts.skipped > 0 {
                return match Self::parse_coverage(output) {
                    Some(pct) if pct < self.coverage_threshold => ToolSummary::fail(
                        format!(
                            "coverage {:.1}% below threshold {:.1}%",
                            pct, self.coverage_threshold
                        ),
                        1,
                    ),
                    Some(pct) => {
                        ToolSummary::pass(format!("{} passed, coverage {:.1}%", counts.passed, pct))
                    }
                    None => ToolSummary::pass(format!("{} passed", counts.passed)),
                };
            }
        }

        if output.trim().is_empty() {
            return ToolSummary::empty_output();
        }
        ToolSummary::unknown("no test summary found")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ToolStatus;

    const COVERAGE_TABLE: &str = "---------- coverage: platform linux ----------\nName      Stmts   Miss  Cover\n-----------------------------\napp.py       50      5    90%\nTOTAL       120     12    90%\n";

    #[test]
    fn test_failures_fail_with_count() {
        let out = "FAILED tests/test_a.py::test_x - AssertionError\n===== 2 failed, 10 passed, 1 skipped in 3.21s =====\n";
        let summary = TestRunnerClassifier::pytest(80.0).classify(out);
        assert_eq!(summary.status, ToolStatus::Fail);
        assert_eq!(summary.issues, 2);
    }

    #[test]
    fn test_collection_errors_count() {
        let out = "==== 1 error in 0.10s ====\n";
        let summary = TestRunnerClassifier::pytest(80.0).classify(out);
        assert_eq!(summary.status, ToolStatus::Fail);
        assert_eq!(summary.issues, 1);
    }

    #[test]
    fn test_passing_with_coverage_above_threshold() {
        let out = format!("{}===== 12 passed in 1.02s =====\n", COVERAGE_TABLE);
        let summary = TestRunnerClassifier::pytest(80.0).classify(&out);
        assert_eq!(summary.status, ToolStatus::Pass);
        assert!(summary.reason.contains("90.0%"));
    }

    #[test]
    fn test_coverage_below_threshold_fails() {
        let out = format!("{}===== 12 passed in 1.02s =====\n", COVERAGE_TABLE);
        let summary = TestRunnerClassifier::pytest(95.0).classify(&out);
        assert_eq!(summary.status, ToolStatus::Fail);
        assert_eq!(summary.issues, 1);
        assert!(summary.reason.contains("below threshold 95.0%"));
    }

    #[test]
    fn test_no_tests_skip() {
        let out = "collected 0 items\n\n==== no tests ran in 0.01s ====\n";
        assert_eq!(
            TestRunnerClassifier::pytest(80.0).classify(out).status,
            ToolStatus::Skip
        );
    }

    #[test]
    fn test_parse_counts_and_coverage() {
        let out = "== 3 failed, 4 passed, 2 xfailed, 1 warning in 0.5s ==";
        assert_eq!(
            TestRunnerClassifier::parse_counts(out),
            Some(TestCounts {
                passed: 4,
                failed: 3,
                errors: 0,
                skipped: 2
            })
        );
        assert_eq!(
            TestRunnerClassifier::parse_coverage("TOTAL 120 12 40 4 88.5%"),
            Some(88.5)
        );
        assert_eq!(TestRunnerClassifier::parse_coverage("nothing"), None);
    }

    #[test]
    fn test_unrecognized_output_unknown() {
        let summary = TestRunnerClassifier::pytest(80.0).classify("ImportError: boom");
        assert_eq!(summary.status, ToolStatus::Unknown);
    }
}
