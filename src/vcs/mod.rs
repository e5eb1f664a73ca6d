//! Version-control operations the review workflow consumes.

mod git;

pub use git::GitVcs;

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
}

/// One file touched between two refs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub path: String,
    pub change: ChangeKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStat {
    pub files: usize,
    pub insertions: usize,
    pub deletions: usize,
}

/// Repository operations used by the orchestrator.
pub trait Vcs {
    /// Name of the checked-out branch; `None` when detached or unborn.
    fn current_branch(&self) -> Result<Option<String>>;

    /// Full commit id a ref (branch, tag, sha) points at.
    fn resolve_ref(&self, name: &str) -> Result<String>;

    fn branch_exists(&self, name: &str) -> Result<bool>;

    /// Local branches starting with `prefix` whose head is contained in `base`.
    fn merged_branches(&self, base: &str, prefix: &str) -> Result<Vec<String>>;

    /// Files changed from the merge base of `base` and `target` to `target`.
    fn changed_files(&self, base: &str, target: &str) -> Result<Vec<ChangedFile>>;

    fn diff_stat(&self, base: &str, target: &str) -> Result<DiffStat>;

    /// Unified diff, same range as [`Vcs::changed_files`].
    fn diff_text(&self, base: &str, target: &str) -> Result<String>;

    fn create_branch(&self, name: &str, at: &str, force: bool) -> Result<()>;

    fn delete_branch(&self, name: &str) -> Result<()>;

    /// Move `branch` forward to `to`. Fails unless it is a fast-forward.
    fn fast_forward(&self, branch: &str, to: &str) -> Result<()>;
}
