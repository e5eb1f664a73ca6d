use anyhow::{Context, Result, bail};
use git2::{BranchType, Delta, DiffOptions, Oid, Repository};
use std::path::Path;

use super::{ChangeKind, ChangedFile, DiffStat, Vcs};
use crate::errors::ReviewError;

pub struct GitVcs {
    repo: Repository,
}

impl GitVcs {
    pub fn open(project_dir: &Path) -> Result<Self> {
        let repo = Repository::open(project_dir).context("Failed to open git repository")?;
        Ok(Self { repo })
    }

    fn commit_for(&self, name: &str) -> Result<git2::Commit<'_>> {
        let object = self.repo.revparse_single(name).map_err(|_| ReviewError::NotFound {
            kind: "Ref",
            name: name.to_string(),
        })?;
        object
            .peel_to_commit()
            .with_context(|| format!("'{}' does not point at a commit", name))
    }

    /// Diff from the merge base of `base`/`target` to `target`.
    fn range_diff(&self, base: &str, target: &str) -> Result<git2::Diff<'_>> {
        let base_commit = self.commit_for(base)?;
        let target_commit = self.commit_for(target)?;
        let from = match self.repo.merge_base(base_commit.id(), target_commit.id()) {
            Ok(oid) => self.repo.find_commit(oid)?,
            Err(_) => base_commit,
        };
        let mut opts = DiffOptions::new();
        let mut diff = self.repo.diff_tree_to_tree(
            Some(&from.tree()?),
            Some(&target_commit.tree()?),
            Some(&mut opts),
        )?;
        diff.find_similar(None)?;
        Ok(diff)
    }
}

impl Vcs for GitVcs {
    fn current_branch(&self) -> Result<Option<String>> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(_) => return Ok(None),
        };
        if !head.is_branch() {
            return Ok(None);
        }
        Ok(head.shorthand().map(str::to_string))
    }

    fn resolve_ref(&self, name: &str) -> Result<String> {
        Ok(self.commit_for(name)?.id().to_string())
    }

    fn branch_exists(&self, name: &str) -> Result<bool> {
        Ok(self.repo.find_branch(name, BranchType::Local).is_ok())
    }

    fn merged_branches(&self, base: &str, prefix: &str) -> Result<Vec<String>> {
        let base_id = self.commit_for(base)?.id();
        let mut merged = Vec::new();
        for branch in self.repo.branches(Some(BranchType::Local))? {
            let (branch, _) = branch?;
            let Some(name) = branch.name()?.map(str::to_string) else {
                continue;
            };
            if !name.starts_with(prefix) {
                continue;
            }
            let Some(head) = branch.get().target() else {
                continue;
            };
            if head == base_id || self.repo.graph_descendant_of(base_id, head)? {
                merged.push(name);
            }
        }
        merged.sort();
        Ok(merged)
    }

    fn changed_files(&self, base: &str, target: &str) -> Result<Vec<ChangedFile>> {
        let diff = self.range_diff(base, target)?;
        let mut files = Vec::new();
        for delta in diff.deltas() {
            let change = match delta.status() {
                Delta::Added => ChangeKind::Added,
                Delta::Modified => ChangeKind::Modified,
                Delta::Deleted => ChangeKind::Deleted,
                Delta::Renamed => ChangeKind::Renamed,
                _ => continue,
            };
            let file = if change == ChangeKind::Deleted {
                delta.old_file()
            } else {
                delta.new_file()
            };
            if let Some(path) = file.path() {
                files.push(ChangedFile {
                    path: path.to_string_lossy().replace('\\', "/"),
                    change,
                });
            }
        }
        Ok(files)
    }

    fn diff_stat(&self, base: &str, target: &str) -> Result<DiffStat> {
        let stats = self.range_diff(base, target)?.stats()?;
        Ok(DiffStat {
            files: stats.files_changed(),
            insertions: stats.insertions(),
            deletions: stats.deletions(),
        })
    }

    fn diff_text(&self, base: &str, target: &str) -> Result<String> {
        let diff = self.range_diff(base, target)?;
        let mut buf = Vec::new();
        diff.print(git2::DiffFormat::Patch, |_delta, _hunk, line| {
            match line.origin() {
                '+' | '-' | ' ' => buf.push(line.origin() as u8),
                _ => {}
            }
            buf.extend_from_slice(line.content());
            true
        })?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn create_branch(&self, name: &str, at: &str, force: bool) -> Result<()> {
        let commit = self.commit_for(at)?;
        self.repo
            .branch(name, &commit, force)
            .with_context(|| format!("Failed to create branch '{}'", name))?;
        tracing::info!(branch = name, at = %commit.id(), "created branch");
        Ok(())
    }

    fn delete_branch(&self, name: &str) -> Result<()> {
        let mut branch = self
            .repo
            .find_branch(name, BranchType::Local)
            .map_err(|_| ReviewError::NotFound {
                kind: "Branch",
                name: name.to_string(),
            })?;
        if branch.is_head() {
            bail!("Cannot delete the checked-out branch '{}'", name);
        }
        branch
            .delete()
            .with_context(|| format!("Failed to delete branch '{}'", name))?;
        Ok(())
    }

    fn fast_forward(&self, branch: &str, to: &str) -> Result<()> {
        let target = self.commit_for(to)?.id();
        let mut reference = self
            .repo
            .find_branch(branch, BranchType::Local)
            .map_err(|_| ReviewError::NotFound {
                kind: "Branch",
                name: branch.to_string(),
            })?
            .into_reference();
        let current = reference
            .target()
            .with_context(|| format!("Branch '{}' has no target", branch))?;
        if current == target {
            return Ok(());
        }
        if !self.repo.graph_descendant_of(target, current)? {
            return Err(ReviewError::precondition(format!(
                "'{}' cannot be fast-forwarded to {}: histories diverged",
                branch,
                short(target)
            ))
            .into());
        }

        let is_head = self
            .repo
            .head()
            .ok()
            .and_then(|h| h.name().map(|n| n == reference.name().unwrap_or_default()))
            .unwrap_or(false);
        reference.set_target(target, &format!("tribunal: fast-forward to {}", target))?;
        if is_head {
            // Bring index and working tree along with the moved branch.
            self.repo
                .checkout_head(Some(git2::build::CheckoutBuilder::new().safe()))
                .context("Failed to update working tree after fast-forward")?;
        }
        tracing::info!(branch, to = %target, "fast-forwarded");
        Ok(())
    }
}

fn short(oid: Oid) -> String {
    oid.to_string().chars().take(7).collect()
}
