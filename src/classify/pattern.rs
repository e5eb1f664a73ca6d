//! Phrase and pattern driven classifiers (eslint, tsc, mypy, generic).

use regex::Regex;
use std::sync::LazyLock;

use super::{Classifier, ToolSummary};

// eslint
static ESLINT_SKIP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)no files matching the pattern|all files matched by .* are ignored").unwrap()
});
// `✖ 3 problems (2 errors, 1 warning)` or a plain `Found 2 errors` summary
static ESLINT_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:✖ \d+ problems? \(|Found )(\d+) errors?").unwrap());
static ESLINT_CITATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s+\d+:\d+\s+error\s").unwrap());

// tsc
static TSC_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Found (\d+) errors?").unwrap());
static TSC_CITATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)error TS\d+:").unwrap());

// mypy
static MYPY_SKIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"There are no \.py\[i\] files|No files to check").unwrap());
static MYPY_SUCCESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Success: no issues found").unwrap());
static MYPY_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Found (\d+) errors?(?: in \d+ files?)?").unwrap());
static MYPY_CITATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\S+:\d+(?::\d+)?: error:").unwrap());

// generic
// Whole-run phrasing only, at the start of a line. A "1 file skipped" aside
// inside a failure summary is not a skip.
static GENERIC_SKIP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(skipped|no files to (check|lint)|nothing to (check|do))\b").unwrap()
});
static GENERIC_SUCCESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(all checks passed|no (issues|errors|problems) found)\b").unwrap()
});
static GENERIC_COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d+) (errors?|problems?|issues?|failures?)\b").unwrap()
});
static GENERIC_CITATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\S+:\d+(?::\d+)?:?\s+(error|fatal)\b").unwrap());

/// Classifier built from a handful of regexes.
///
/// The count pattern's first capture group is the issue count. A parsed
/// count of zero with no citation lines is read as success.
pub struct PatternClassifier {
    name: String,
    skip: Option<&'static Regex>,
    success: Option<&'static Regex>,
    count: Option<&'static Regex>,
    citation: Option<&'static Regex>,
}

impl PatternClassifier {
    pub fn eslint() -> Self {
        Self {
            name: "eslint".to_string(),
            skip: Some(&*ESLINT_SKIP),
            success: None,
            count: Some(&*ESLINT_COUNT),
            citation: Some(&*ESLINT_CITATION),
        }
    }

    pub fn tsc() -> Self {
        Self {
            name: "tsc".to_string(),
            skip: None,
            success: None,
            count: Some(&*TSC_COUNT),
            citation: Some(&*TSC_CITATION),
        }
    }

    pub fn mypy() -> Self {
        Self {
            name: "mypy".to_string(),
            skip: Some(&*MYPY_SKIP),
            success: Some(&*MYPY_SUCCESS),
            count: Some(&*MYPY_COUNT),
            citation: Some(&*MYPY_CITATION),
        }
    }

    pub fn generic(name: &str) -> Self {
        Self {
            name: name.to_string(),
            skip: Some(&*GENERIC_SKIP),
            success: Some(&*GENERIC_SUCCESS),
            count: Some(&*GENERIC_COUNT),
            citation: Some(&*GENERIC_CITATION),
        }
    }

    fn parsed_count(&self, output: &str) -> Option<u32> {
        let re = self.count?;
        // Several summary lines can appear (e.g. per project); add them up.
        let mut total = None;
        for cap in re.captures_iter(output) {
            if let Some(n) = cap.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) {
                total = Some(total.unwrap_or(0) + n);
            }
        }
        total
    }
}

impl Classifier for PatternClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn classify(&self, output: &str) -> ToolSummary {
        if let Some(m) = self.skip.and_then(|re| re.find(output)) {
            return ToolSummary::skip(m.as_str().trim());
        }
        if let Some(m) = self.success.and_then(|re| re.find(output)) {
            return ToolSummary::pass(m.as_str().trim());
        }

        let citations = self
            .citation
            .map(|re| re.find_iter(output).count() as u32)
            .unwrap_or(0);
        match self.parsed_count(output) {
            Some(0) if citations == 0 => return ToolSummary::pass("0 issues reported"),
            Some(n) if n > 0 => {
                return ToolSummary::fail(format!("{} issue(s) reported", n), n);
            }
            _ => {}
        }
        if citations > 0 {
            return ToolSummary::fail(format!("{} issue line(s) cited", citations), citations);
        }

        if output.trim().is_empty() {
            return ToolSummary::empty_output();
        }
        ToolSummary::unknown(format!("unrecognized {} output", self.name))
    }
}
