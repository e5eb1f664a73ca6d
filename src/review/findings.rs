//! Finding types extracted from participant reports.
//!
//! ## Types
//!
//! - [`Priority`]: P0/P1/P2 tier of a finding
//! - [`Location`]: file plus optional line range
//! - [`Finding`]: a single issue reported by an agent
//! - [`PriorityCounts`]: per-tier totals used by validation and verdicts
//!
//! ## Example
//!
//! ```
//! use tribunal::review::findings::{Finding, Location, Priority};
//!
//! let finding = Finding::new("P0-1", Priority::P0, "Unchecked unwrap in parser")
//!     .with_location(Location::new("src/parser.rs").with_lines(42, None))
//!     .with_evidence("let v = input.parse().unwrap();");
//!
//! assert!(finding.priority.is_blocking());
//! assert_eq!(finding.location.as_ref().unwrap().to_string(), "src/parser.rs:42");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Priority tier of a finding. P0 blocks the verdict.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Priority {
    P0,
    P1,
    P2,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::P0, Priority::P1, Priority::P2];

    /// Whether findings of this tier fail the verdict.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::P0)
    }

    pub fn from_digit(digit: u32) -> Option<Self> {
        match digit {
            0 => Some(Self::P0),
            1 => Some(Self::P1),
            2 => Some(Self::P2),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::P0 => "P0",
            Self::P1 => "P1",
            Self::P2 => "P2",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "P0" => Ok(Self::P0),
            "P1" => Ok(Self::P1),
            "P2" => Ok(Self::P2),
            _ => anyhow::bail!("Invalid priority '{}'. Valid values: P0, P1, P2", s),
        }
    }
}

/// Where a finding points in the code under review.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_start: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_end: Option<u32>,
}

impl Location {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line_start: None,
            line_end: None,
        }
    }

    pub fn with_lines(mut self, start: u32, end: Option<u32>) -> Self {
        self.line_start = Some(start);
        self.line_end = end.filter(|e| *e > start);
        self
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line_start, self.line_end) {
            (Some(start), Some(end)) => write!(f, "{}:{}-{}", self.file, start, end),
            (Some(start), None) => write!(f, "{}:{}", self.file, start),
            _ => write!(f, "{}", self.file),
        }
    }
}

/// A single issue reported by a review agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub priority: Priority,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

impl Finding {
    pub fn new(id: impl Into<String>, priority: Priority, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            priority,
            title: title.into(),
            location: None,
            description: String::new(),
            evidence: None,
        }
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }

    pub fn has_evidence(&self) -> bool {
        self.evidence.is_some() || self.location.as_ref().is_some_and(|l| l.line_start.is_some())
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.priority, self.id, self.title)?;
        if let Some(ref location) = self.location {
            write!(f, " ({})", location)?;
        }
        Ok(())
    }
}

/// Per-tier totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityCounts {
    pub p0: u32,
    pub p1: u32,
    pub p2: u32,
}

impl PriorityCounts {
    pub fn new(p0: u32, p1: u32, p2: u32) -> Self {
        Self { p0, p1, p2 }
    }

    pub fn get(&self, priority: Priority) -> u32 {
        match priority {
            Priority::P0 => self.p0,
            Priority::P1 => self.p1,
            Priority::P2 => self.p2,
        }
    }

    pub fn add(&mut self, priority: Priority, n: u32) {
        match priority {
            Priority::P0 => self.p0 += n,
            Priority::P1 => self.p1 += n,
            Priority::P2 => self.p2 += n,
        }
    }

    pub fn merge(&mut self, other: &PriorityCounts) {
        self.p0 += other.p0;
        self.p1 += other.p1;
        self.p2 += other.p2;
    }

    pub fn total(&self) -> u32 {
        self.p0 + self.p1 + self.p2
    }

    pub fn from_findings<'a>(findings: impl IntoIterator<Item = &'a Finding>) -> Self {
        let mut counts = Self::default();
        for finding in findings {
            counts.add(finding.priority, 1);
        }
        counts
    }
}

impl fmt::Display for PriorityCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P0={} P1={} P2={}", self.p0, self.p1, self.p2)
    }
}
