//! Key-value artifact storage.
//!
//! Every persisted artifact is addressed by a `/`-separated key relative to
//! the state directory (`runs/<id>/run.json`, `current`, ...). [`FsStore`]
//! maps keys to files and writes them atomically; [`MemoryStore`] backs unit
//! tests.

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use walkdir::WalkDir;

/// Minimal storage interface the engine needs.
pub trait ArtifactStore: Send + Sync {
    /// Read an artifact. `Ok(None)` when it does not exist.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Create or replace an artifact wholesale.
    fn put(&self, key: &str, content: &str) -> Result<()>;

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// List keys starting with `prefix`, sorted.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Delete every artifact whose key starts with `prefix`.
    fn remove_prefix(&self, prefix: &str) -> Result<usize>;

    /// Filesystem location of a key, when the store is disk-backed.
    fn local_path(&self, _key: &str) -> Option<PathBuf> {
        None
    }
}

/// Serialize `value` as pretty JSON and store it under `key`.
pub fn put_json<T: Serialize>(store: &dyn ArtifactStore, key: &str, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize artifact {}", key))?;
    store.put(key, &json)
}

/// Disk-backed store rooted at the state directory.
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|part| !part.is_empty() && *part != "..")
            .fold(self.root.clone(), |acc, part| acc.join(part))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }
}

impl ArtifactStore for FsStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read artifact: {}", path.display()))?;
        Ok(Some(content))
    }

    fn put(&self, key: &str, content: &str) -> Result<()> {
        let path = self.path_for(key);
        let parent = path
            .parent()
            .with_context(|| format!("Artifact key has no parent directory: {}", key))?;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

        // Write next to the target and rename so readers never see partial content.
        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
        tmp.write_all(content.as_bytes())
            .with_context(|| format!("Failed to write artifact: {}", path.display()))?;
        tmp.persist(&path)
            .with_context(|| format!("Failed to persist artifact: {}", path.display()))?;
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut keys: Vec<String> = WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| self.key_for(entry.path()))
            .filter(|key| key.starts_with(prefix))
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn remove_prefix(&self, prefix: &str) -> Result<usize> {
        let keys = self.list(prefix)?;
        for key in &keys {
            let path = self.path_for(key);
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove artifact: {}", path.display()))?;
        }
        // Drop the directory too when the prefix names one.
        let dir = self.path_for(prefix.trim_end_matches('/'));
        if prefix.ends_with('/') && dir.is_dir() {
            std::fs::remove_dir_all(&dir)
                .with_context(|| format!("Failed to remove directory: {}", dir.display()))?;
        }
        Ok(keys.len())
    }

    fn local_path(&self, key: &str) -> Option<PathBuf> {
        Some(self.path_for(key))
    }
}

/// In-memory store for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("Artifact store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, content: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("Artifact store lock poisoned"))?;
        entries.insert(key.to_string(), content.to_string());
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("Artifact store lock poisoned"))?;
        Ok(entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn remove_prefix(&self, prefix: &str) -> Result<usize> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("Artifact store lock poisoned"))?;
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        Ok(before - entries.len())
    }
}

/// Exclusive advisory lock held for the duration of a mutating command.
///
/// Released when dropped.
pub struct StateLock {
    file: File,
}

impl StateLock {
    /// Acquire the lock file under `state_dir`, failing fast if another
    /// invocation holds it.
    pub fn acquire(state_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_dir)
            .with_context(|| format!("Failed to create directory: {}", state_dir.display()))?;
        let path = state_dir.join(".lock");
        let file = File::create(&path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;
        file.try_lock_exclusive().with_context(|| {
            format!(
                "Another tribunal command is mutating this review (lock held on {})",
                path.display()
            )
        })?;
        tracing::debug!(path = %path.display(), "acquired state lock");
        Ok(Self { file })
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
