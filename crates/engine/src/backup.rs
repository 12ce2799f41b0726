//! Pre-mutation snapshots for destructive operations.

use std::{
    fs,
    path::{Path, PathBuf},
};

use {chrono::Utc, tracing::warn};

use crate::{
    error::{Error, Result},
    store::ConfigStore,
    types::{Layer, SnippetEntry},
};

/// A completed snapshot: direct copies, not diffs. Retention is the
/// operator's concern; records are never auto-deleted.
#[derive(Debug, Clone)]
pub struct BackupRecord {
    /// `<backups root>/<timestamp>_<entryName>`
    pub dir: PathBuf,
    pub entry_name: String,
    pub timestamp: String,
    /// Every file copied into the record.
    pub copied: Vec<PathBuf>,
}

/// Snapshots the layer documents and an entry's content files before an
/// update or delete. A failed copy raises [`Error::BackupFailed`] and the
/// caller must abort its mutation: fail-closed, because the mutation is
/// otherwise irreversible.
pub struct BackupManager {
    root: PathBuf,
}

impl BackupManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn backup(&self, entry: &SnippetEntry, store: &ConfigStore) -> Result<BackupRecord> {
        let timestamp = Utc::now().format("%Y%m%dT%H%M%S%3f").to_string();
        let dir = self.record_dir(&timestamp, &entry.name);
        fs::create_dir_all(&dir).map_err(|e| self.failed(&entry.name, e))?;

        let mut copied = Vec::new();
        for layer in [Layer::Base, Layer::Local] {
            let source = store.layer_path(layer);
            if source.exists() {
                copied.push(self.copy_into(&dir, &source, &entry.name)?);
            }
        }
        for content_ref in &entry.content_refs {
            let source = store.resolve_content_path(content_ref);
            if !source.exists() {
                // Already dangling; nothing to preserve, and refusing here
                // would make the entry impossible to delete.
                warn!(path = %source.display(), entry = %entry.name, "content ref missing, not backed up");
                continue;
            }
            copied.push(self.copy_into(&dir, &source, &entry.name)?);
        }

        Ok(BackupRecord {
            dir,
            entry_name: entry.name.clone(),
            timestamp,
            copied,
        })
    }

    /// Timestamp tokens sort lexicographically; a same-millisecond collision
    /// for the same entry gets a numeric suffix.
    fn record_dir(&self, timestamp: &str, name: &str) -> PathBuf {
        let base = self.root.join(format!("{timestamp}_{name}"));
        if !base.exists() {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = self.root.join(format!("{timestamp}_{name}_{n}"));
            if !candidate.exists() {
                return candidate;
            }
            n += 1;
        }
    }

    fn copy_into(&self, dir: &Path, source: &Path, entry_name: &str) -> Result<PathBuf> {
        let file_name = source
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed".to_string());
        let mut dest = dir.join(&file_name);
        let mut n = 2;
        while dest.exists() {
            dest = dir.join(format!("{n}_{file_name}"));
            n += 1;
        }
        fs::copy(source, &dest).map_err(|e| self.failed(entry_name, e))?;
        Ok(dest)
    }

    fn failed(&self, name: &str, source: std::io::Error) -> Error {
        Error::BackupFailed {
            name: name.to_string(),
            source,
        }
    }
}
