//! Review submissions and their outcomes.
//!
//! ## Components
//!
//! - [`findings`]: priority tiers, locations and findings
//! - [`contract`]: structural validation of agent reports
//! - [`participants`]: persisted per-participant status records
//! - [`policy`]: who may submit, and when a submission may be replaced
//! - [`verdict`]: aggregation of statuses into PASS/FAIL/INCOMPLETE/INVALID
//! - [`handoff`]: patch candidates built from the aggregated findings
//!
//! ## Example
//!
//! ```
//! use tribunal::review::{validate_report, Priority};
//!
//! let report = "## Summary\nLooks fine.\n\n## P1 Findings\n\n### P1-1: Missing timeout\nLocation: src/net.rs:12\n\n## Verdict\nPASS\n";
//! let result = validate_report(report);
//! assert!(result.valid);
//! assert_eq!(result.counts.get(Priority::P1), 1);
//! ```

pub mod contract;
pub mod findings;
pub mod handoff;
pub mod participants;
pub mod policy;
pub mod verdict;

pub use contract::{MAX_REPORT_LINES, ValidationResult, validate_report};
pub use findings::{Finding, Location, Priority, PriorityCounts};
pub use participants::{Category, ParticipantState, ParticipantStatus, StatusRecord};
pub use policy::{Decision, Rejection, Submission, authorize};
pub use verdict::{FinalVerdict, Verdict, aggregate};
