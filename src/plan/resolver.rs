//! SSOT plan resolution.
//!
//! Discovery walks the configured glob roots and the allow-listed directory
//! and returns candidate paths. Resolution is a pure function of the
//! candidate set and the review branch name, so the same inputs always pick
//! the same plan.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

/// Filename equal to an identifier.
pub const SCORE_EXACT_FILENAME: u32 = 100;
/// Filename containing an identifier.
pub const SCORE_FILENAME_CONTAINS: u32 = 50;
/// Directory part of the path containing an identifier.
pub const SCORE_DIRECTORY_CONTAINS: u32 = 20;
pub const ALLOWLIST_BOOST: u32 = 30;
/// Lead the top candidate needs over the runner-up to be chosen.
pub const FOUND_MARGIN: u32 = 20;
pub const MAX_AMBIGUOUS_CANDIDATES: usize = 5;

static REVIEW_BRANCH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^review/(?P<base>[^/]+?)--(?P<slug>.+)--(?P<sha>[0-9a-fA-F]{6,40})$").unwrap()
});

static TASK_CODE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Z]{2,}-?\d+").unwrap());

static KEBAB_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    Found,
    Missing,
    Ambiguous,
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Found => "FOUND",
            Self::Missing => "MISSING",
            Self::Ambiguous => "AMBIGUOUS",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    Resolved,
    Explicit,
}

/// A discovered plan file, relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: String,
    pub allowlisted: bool,
}

impl Candidate {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            allowlisted: false,
        }
    }

    pub fn allowlisted(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            allowlisted: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub path: String,
    pub score: u32,
}

/// Outcome of plan resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub status: PlanStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub source: PlanSource,
    #[serde(default)]
    pub identifiers: Vec<String>,
    /// Ranked candidates; at most five when ambiguous.
    #[serde(default)]
    pub candidates: Vec<ScoredCandidate>,
}

impl Resolution {
    /// A plan chosen by the operator, bypassing scoring.
    pub fn explicit(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            status: PlanStatus::Found,
            candidates: vec![ScoredCandidate {
                path: path.clone(),
                score: 0,
            }],
            path: Some(path),
            source: PlanSource::Explicit,
            identifiers: Vec::new(),
        }
    }
}

/// Identifiers extracted from a review branch name, de-duplicated in
/// first-seen order.
pub fn branch_identifiers(branch: &str) -> Vec<String> {
    let mut raw: Vec<&str> = Vec::new();

    if let Some(caps) = REVIEW_BRANCH_REGEX.captures(branch) {
        raw.push(caps.name("base").map_or("", |m| m.as_str()));
        raw.push(caps.name("sha").map_or("", |m| m.as_str()));
    }

    raw.extend(TASK_CODE_REGEX.find_iter(branch).map(|m| m.as_str()));

    raw.extend(
        branch
            .split('/')
            .flat_map(|part| part.split("--"))
            .filter(|seg| seg.len() > 2 && *seg != "review" && KEBAB_REGEX.is_match(seg)),
    );

    let mut seen = HashSet::new();
    raw.into_iter()
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(id.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// Score one candidate path against the identifiers.
pub fn score_candidate(identifiers: &[String], candidate: &Candidate) -> u32 {
    let path = candidate.path.to_lowercase();
    let (dir, filename) = match path.rsplit_once('/') {
        Some((dir, file)) => (dir, file),
        None => ("", path.as_str()),
    };

    let mut score = 0;
    for id in identifiers {
        let id = id.to_lowercase();
        if filename == id {
            score += SCORE_EXACT_FILENAME;
        } else if filename.contains(&id) {
            score += SCORE_FILENAME_CONTAINS;
        }
        if dir.contains(&id) {
            score += SCORE_DIRECTORY_CONTAINS;
        }
    }
    if candidate.allowlisted {
        score += ALLOWLIST_BOOST;
    }
    score
}

/// Resolve the SSOT plan among `candidates` for `branch`.
pub fn resolve(candidates: &[Candidate], branch: &str) -> Resolution {
    let identifiers = branch_identifiers(branch);

    let mut scored: Vec<ScoredCandidate> = candidates
        .iter()
        .map(|c| (c, score_candidate(&identifiers, c)))
        .filter(|(c, score)| *score > 0 || c.allowlisted)
        .map(|(c, score)| ScoredCandidate {
            path: c.path.clone(),
            score,
        })
        .collect();
    scored.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.path.cmp(&b.path)));

    let status = match scored.as_slice() {
        [] => PlanStatus::Missing,
        [_] => PlanStatus::Found,
        [top, runner_up, ..] if top.score - runner_up.score >= FOUND_MARGIN => PlanStatus::Found,
        _ => PlanStatus::Ambiguous,
    };

    let path = (status == PlanStatus::Found).then(|| scored[0].path.clone());
    scored.truncate(MAX_AMBIGUOUS_CANDIDATES);

    Resolution {
        status,
        path,
        source: PlanSource::Resolved,
        identifiers,
        candidates: scored,
    }
}

/// Find candidate plan files under `project_dir`.
///
/// Each root is a glob relative to the project. Files under `allowlist`
/// are marked so they receive the boost. Results are de-duplicated and
/// sorted by path.
pub fn discover(project_dir: &Path, roots: &[String], allowlist: Option<&Path>) -> Result<Vec<Candidate>> {
    let base = glob::Pattern::escape(&project_dir.to_string_lossy());
    let mut found: BTreeMap<String, bool> = BTreeMap::new();

    for root in roots {
        let pattern = format!("{}/{}", base, root.trim_start_matches("./"));
        for path in glob::glob(&pattern)
            .with_context(|| format!("Invalid plan root pattern: {}", root))?
            .filter_map(|entry| entry.ok())
            .filter(|p| p.is_file())
        {
            if let Some(rel) = relative_to(project_dir, &path) {
                found.entry(rel).or_insert(false);
            }
        }
    }

    if let Some(dir) = allowlist
        && dir.is_dir()
    {
        let pattern = format!("{}/**/*.md", glob::Pattern::escape(&dir.to_string_lossy()));
        for path in glob::glob(&pattern)
            .context("Invalid allowlist pattern")?
            .filter_map(|entry| entry.ok())
            .filter(|p| p.is_file())
        {
            let rel = relative_to(project_dir, &path)
                .unwrap_or_else(|| path.to_string_lossy().replace('\\', "/"));
            found.insert(rel, true);
        }
    }

    tracing::debug!(count = found.len(), "discovered plan candidates");
    Ok(found
        .into_iter()
        .map(|(path, allowlisted)| Candidate { path, allowlisted })
        .collect())
}

fn relative_to(root: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(root)
        .ok()
        .map(|p| p.to_string_lossy().replace('\\', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_identifiers_from_review_branch() {
        let ids = branch_identifiers("review/main--feature-x--abc1234");
        assert_eq!(ids, vec!["main", "abc1234", "feature-x"]);
    }

    #[test]
    fn test_identifiers_task_codes_and_kebab() {
        let ids = branch_identifiers("review/develop--PROJ-123-login-fix--0a1b2c3");
        assert_eq!(ids[0], "develop");
        assert_eq!(ids[1], "0a1b2c3");
        assert!(ids.contains(&"PROJ-123".to_string()));
        // Mixed-case segment is not kebab-case
        assert!(!ids.iter().any(|i| i == "PROJ-123-login-fix"));

        let ids = branch_identifiers("feature/ABC42--db-migration/ui");
        assert_eq!(ids, vec!["ABC42", "feature", "db-migration"]);
    }

    #[test]
    fn test_identifiers_deduplicate_case_insensitively() {
        let ids = branch_identifiers("review/main--main--deadbeef");
        assert_eq!(ids, vec!["main", "deadbeef"]);
    }

    #[test]
    fn test_scoring_rules() {
        let ids = vec!["feature-x".to_string()];
        assert_eq!(score_candidate(&ids, &Candidate::new("feature-x")), 100);
        assert_eq!(score_candidate(&ids, &Candidate::new("docs/plans/feature-x.md")), 50);
        assert_eq!(
            score_candidate(&ids, &Candidate::new("docs/plans/feature-x/feature-x.md")),
            70
        );
        assert_eq!(score_candidate(&ids, &Candidate::new("docs/feature-x/notes.md")), 20);
        assert_eq!(score_candidate(&ids, &Candidate::allowlisted("a/other.md")), 30);
        assert_eq!(score_candidate(&ids, &Candidate::new("DOCS/FEATURE-X.MD")), 50);
    }

    #[test]
    fn test_flat_names_tie_and_stay_ambiguous() {
        let candidates = vec![
            Candidate::new("docs/plans/feature-x.md"),
            Candidate::new("docs/plans/main.md"),
        ];
        let res = resolve(&candidates, "review/main--feature-x--abc123");
        assert_eq!(res.status, PlanStatus::Ambiguous);
        assert_eq!(res.path, None);
        assert_eq!(res.candidates[0].path, "docs/plans/feature-x.md");
        assert_eq!(res.candidates[0].score, res.candidates[1].score);
    }

    #[test]
    fn test_directory_match_reaches_margin() {
        let candidates = vec![
            Candidate::new("docs/plans/feature-x/feature-x.md"),
            Candidate::new("docs/plans/main.md"),
        ];
        let res = resolve(&candidates, "review/main--feature-x--abc123");
        assert_eq!(res.status, PlanStatus::Found);
        assert_eq!(res.path.as_deref(), Some("docs/plans/feature-x/feature-x.md"));
    }

    #[test]
    fn test_missing_when_nothing_scores() {
        let candidates = vec![Candidate::new("docs/plans/unrelated.md")];
        let res = resolve(&candidates, "review/main--feature-x--abc123");
        assert_eq!(res.status, PlanStatus::Missing);
        assert!(res.candidates.is_empty());
        assert_eq!(resolve(&[], "main").status, PlanStatus::Missing);
    }

    #[test]
    fn test_single_candidate_found() {
        let res = resolve(&[Candidate::allowlisted("approved/x.md")], "review/main--y--abc123");
        assert_eq!(res.status, PlanStatus::Found);
        assert_eq!(res.path.as_deref(), Some("approved/x.md"));
    }

    #[test]
    fn test_ambiguous_lists_top_five() {
        let candidates: Vec<Candidate> = (0..8)
            .map(|i| Candidate::new(format!("plans/login-{}.md", i)))
            .collect();
        let res = resolve(&candidates, "review/main--login--abc123");
        assert_eq!(res.status, PlanStatus::Ambiguous);
        assert_eq!(res.candidates.len(), MAX_AMBIGUOUS_CANDIDATES);
        // Ties sort by path
        assert_eq!(res.candidates[0].path, "plans/login-0.md");
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let a = vec![Candidate::new("p/b-main.md"), Candidate::new("p/a-main.md")];
        let b = vec![Candidate::new("p/a-main.md"), Candidate::new("p/b-main.md")];
        assert_eq!(resolve(&a, "review/main--x--abc123"), resolve(&b, "review/main--x--abc123"));
    }

    #[test]
    fn test_explicit_resolution() {
        let res = Resolution::explicit("docs/my-plan.md");
        assert_eq!(res.status, PlanStatus::Found);
        assert_eq!(res.source, PlanSource::Explicit);
    }

    #[test]
    fn test_discover_roots_and_allowlist() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("docs/plans/sub")).unwrap();
        fs::create_dir_all(root.join("approved")).unwrap();
        fs::write(root.join("docs/plans/a.md"), "# A").unwrap();
        fs::write(root.join("docs/plans/sub/b.md"), "# B").unwrap();
        fs::write(root.join("docs/plans/skip.txt"), "x").unwrap();
        fs::write(root.join("approved/c.md"), "# C").unwrap();

        let roots = vec!["docs/plans/**/*.md".to_string()];
        let found = discover(root, &roots, Some(&root.join("approved"))).unwrap();
        assert_eq!(
            found,
            vec![
                Candidate::allowlisted("approved/c.md"),
                Candidate::new("docs/plans/a.md"),
                Candidate::new("docs/plans/sub/b.md"),
            ]
        );
    }
}
