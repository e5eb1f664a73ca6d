//! Structural validation of submitted review reports.
//!
//! A report is Markdown with a fixed contract:
//!
//! ```text
//! ## Summary
//! ...
//! ## P0 Findings
//! ### P0-1: Title
//! Location: src/lib.rs:42
//! ...
//! ## Statistics
//! | Priority | Count |
//! | P0 | 1 |
//! ## Test Plan
//! ## Confidence
//! ## Verdict
//! ```
//!
//! Errors block ingestion (the participant becomes INVALID); warnings only
//! degrade confidence.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::findings::{Finding, Location, Priority, PriorityCounts};

/// Maximum number of lines a report may have.
pub const MAX_REPORT_LINES: usize = 120;

static HEADING_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s{0,3}#{1,6}\s+(.+?)\s*#*\s*$").unwrap());

// "P0-1: Title", "[P1] 2. Title", "P2 #3 - Title", "P0.1 Title"
static FINDING_HEADING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\[?P([0-2])\]?\s*[-.#_ ]\s*#?(\d+)\s*[:.)\-–—]?\s*(.+)$").unwrap()
});

static TIER_SECTION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\[?P([0-2])\]?\b").unwrap());

static SUMMARY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(executive\s+)?summary\b").unwrap());

static VERDICT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(final\s+)?verdict\b").unwrap());

static TEST_PLAN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^test(ing)?\s+plan\b").unwrap());

static STATISTICS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^stat(istic)?s\b").unwrap());

static CONFIDENCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^confidence\b").unwrap());

static NO_FINDINGS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(no\s+(findings|issues)(\s+(were\s+)?(found|identified|detected|reported))?|nothing\s+to\s+report)\b")
        .unwrap()
});

static FILE_LINE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"`?([A-Za-z0-9_./\\-]+\.[A-Za-z0-9]+):(\d+)(?:[-–](\d+))?`?").unwrap()
});

static EVIDENCE_LABEL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*[-*]?\s*\**(location|evidence|file)\**\s*:").unwrap()
});

// "| P0 | 2 |" or "| **P1** | 0 |"
static STATS_ROW_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*\|\s*\**P([0-2])\**\s*\|\s*(\d+)\s*\|").unwrap());

/// Report sections the validator recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Summary,
    P0,
    P1,
    P2,
    Statistics,
    TestPlan,
    Confidence,
    Verdict,
}

impl Section {
    pub fn for_priority(priority: Priority) -> Self {
        match priority {
            Priority::P0 => Self::P0,
            Priority::P1 => Self::P1,
            Priority::P2 => Self::P2,
        }
    }
}

/// Outcome of validating one report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub line_count: usize,
    pub sections: BTreeMap<Section, bool>,
    pub counts: PriorityCounts,
    /// Whether `counts` came from a statistics table.
    pub counts_from_table: bool,
    #[serde(default)]
    pub findings: Vec<Finding>,
}

impl ValidationResult {
    pub fn has_section(&self, section: Section) -> bool {
        self.sections.get(&section).copied().unwrap_or(false)
    }
}

struct Heading<'a> {
    line_idx: usize,
    text: &'a str,
}

fn headings<'a>(lines: &[&'a str]) -> Vec<Heading<'a>> {
    let mut in_fence = false;
    let mut out = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if let Some(cap) = HEADING_REGEX.captures(line) {
            out.push(Heading {
                line_idx: idx,
                text: cap.get(1).map_or("", |m| m.as_str()),
            });
        }
    }
    out
}

fn strip_emphasis(text: &str) -> &str {
    text.trim().trim_matches(|c| c == '*' || c == '_').trim()
}

/// Validate a report against the contract.
pub fn validate_report(text: &str) -> ValidationResult {
    let lines: Vec<&str> = text.lines().collect();
    let line_count = lines.len();
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if line_count > MAX_REPORT_LINES {
        errors.push(format!(
            "Report exceeds {} lines (actual: {})",
            MAX_REPORT_LINES, line_count
        ));
    }

    let heads = headings(&lines);
    let mut sections: BTreeMap<Section, bool> = [
        Section::Summary,
        Section::P0,
        Section::P1,
        Section::P2,
        Section::Statistics,
        Section::TestPlan,
        Section::Confidence,
        Section::Verdict,
    ]
    .into_iter()
    .map(|s| (s, false))
    .collect();

    let mut findings = Vec::new();
    let mut heading_counts = PriorityCounts::default();

    for (i, head) in heads.iter().enumerate() {
        let text = strip_emphasis(head.text);

        if let Some(cap) = FINDING_HEADING_REGEX.captures(text) {
            let digit = cap[1].parse::<u32>().unwrap_or(9);
            let Some(priority) = Priority::from_digit(digit) else {
                continue;
            };
            let seq = &cap[2];
            let title = strip_emphasis(&cap[3]).to_string();
            sections.insert(Section::for_priority(priority), true);
            heading_counts.add(priority, 1);

            // Body runs to the next heading of any level.
            let body_end = heads
                .get(i + 1)
                .map(|h| h.line_idx)
                .unwrap_or(lines.len());
            let body = lines[head.line_idx + 1..body_end].join("\n");
            let id = format!("{}-{}", priority, seq);

            let finding = finding_from_body(id.clone(), priority, title, &body);
            if !body_has_evidence(&body) {
                warnings.push(format!(
                    "Finding {} has no evidence (file:line, Location/Evidence label, or code block)",
                    id
                ));
            }
            findings.push(finding);
            continue;
        }

        if let Some(cap) = TIER_SECTION_REGEX.captures(text) {
            if let Some(p) = cap[1].parse::<u32>().ok().and_then(Priority::from_digit) {
                sections.insert(Section::for_priority(p), true);
            }
            continue;
        }

        let matched = if SUMMARY_REGEX.is_match(text) {
            Some(Section::Summary)
        } else if VERDICT_REGEX.is_match(text) {
            Some(Section::Verdict)
        } else if TEST_PLAN_REGEX.is_match(text) {
            Some(Section::TestPlan)
        } else if CONFIDENCE_REGEX.is_match(text) {
            Some(Section::Confidence)
        } else if STATISTICS_REGEX.is_match(text) {
            Some(Section::Statistics)
        } else {
            None
        };
        if let Some(section) = matched {
            sections.insert(section, true);
        }
    }

    if !sections[&Section::Summary] {
        errors.push("Missing required section: Summary".to_string());
    }
    if !sections[&Section::Verdict] {
        errors.push("Missing required section: Verdict".to_string());
    }

    let has_tier = sections[&Section::P0] || sections[&Section::P1] || sections[&Section::P2];
    if !has_tier && !NO_FINDINGS_REGEX.is_match(text) {
        warnings.push(
            "No P0/P1/P2 findings sections and no explicit 'no findings' statement".to_string(),
        );
    }
    if !sections[&Section::TestPlan] {
        warnings.push("Recommended section missing: Test Plan".to_string());
    }
    if !sections[&Section::Confidence] {
        warnings.push("Recommended section missing: Confidence".to_string());
    }

    let table_counts = statistics_table(&lines);
    if table_counts.is_some() {
        sections.insert(Section::Statistics, true);
    }
    let counts_from_table = table_counts.is_some();
    let counts = table_counts.unwrap_or(heading_counts);
    if counts_from_table && counts != heading_counts && !findings.is_empty() {
        warnings.push(format!(
            "Statistics table ({}) disagrees with finding headings ({})",
            counts, heading_counts
        ));
    }

    ValidationResult {
        valid: errors.is_empty(),
        errors,
        warnings,
        line_count,
        sections,
        counts,
        counts_from_table,
        findings,
    }
}

fn body_has_evidence(body: &str) -> bool {
    FILE_LINE_REGEX.is_match(body) || EVIDENCE_LABEL_REGEX.is_match(body) || body.contains("```")
}

fn finding_from_body(id: String, priority: Priority, title: String, body: &str) -> Finding {
    let mut finding = Finding::new(id, priority, title);

    if let Some(cap) = FILE_LINE_REGEX.captures(body) {
        let start = cap[2].parse::<u32>().unwrap_or(0);
        let end = cap.get(3).and_then(|m| m.as_str().parse::<u32>().ok());
        finding = finding.with_location(Location::new(&cap[1]).with_lines(start, end));
    }

    let mut description = Vec::new();
    let mut evidence = Vec::new();
    let mut in_fence = false;
    for line in body.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            evidence.push(line);
        } else if !line.trim().is_empty() && !EVIDENCE_LABEL_REGEX.is_match(line) {
            description.push(line.trim());
        }
    }
    if !description.is_empty() {
        finding = finding.with_description(description.join(" "));
    }
    if !evidence.is_empty() {
        finding = finding.with_evidence(evidence.join("\n"));
    }
    finding
}

/// Parse `| P0 | n |` rows. `None` when no row matches.
fn statistics_table(lines: &[&str]) -> Option<PriorityCounts> {
    let mut counts = PriorityCounts::default();
    let mut found = false;
    for line in lines {
        if let Some(cap) = STATS_ROW_REGEX.captures(line) {
            let Some(priority) = cap[1].parse::<u32>().ok().and_then(Priority::from_digit) else {
                continue;
            };
            let n = cap[2].parse::<u32>().unwrap_or(0);
            counts.add(priority, n);
            found = true;
        }
    }
    found.then_some(counts)
}
