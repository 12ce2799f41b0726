//! Layered config persistence with atomic writes.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use crate::{
    error::{Error, Result},
    types::{Layer, Registry, SnippetEntry},
};

/// File-backed snippet store rooted at an explicit directory.
///
/// Holds two layer documents (`snippets.json`, `snippets.local.json`) plus
/// the `snippets/` content directory. Constructed with an explicit root and
/// passed by reference; there is no ambient global store.
pub struct ConfigStore {
    root: PathBuf,
}

impl ConfigStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layer_path(&self, layer: Layer) -> PathBuf {
        self.root.join(layer.file_name())
    }

    /// Directory where inline-created content files are materialized.
    pub fn content_dir(&self) -> PathBuf {
        self.root.join("snippets")
    }

    /// Resolve a content ref against the store root, never the process CWD.
    pub fn resolve_content_path(&self, content_ref: &Path) -> PathBuf {
        if content_ref.is_absolute() {
            content_ref.to_path_buf()
        } else {
            self.root.join(content_ref)
        }
    }

    /// Load both layers and return the registry. A missing document is an
    /// empty layer; a malformed one is [`Error::ConfigCorrupt`], surfaced
    /// rather than repaired.
    pub fn load(&self) -> Result<Registry> {
        Ok(Registry {
            base: self.load_layer(Layer::Base)?,
            local: self.load_layer(Layer::Local)?,
        })
    }

    fn load_layer(&self, layer: Layer) -> Result<Vec<SnippetEntry>> {
        let path = self.layer_path(layer);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = fs::read_to_string(&path)?;
        let entries: Vec<SnippetEntry> =
            serde_json::from_str(&data).map_err(|e| Error::ConfigCorrupt {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        // Same name twice in one document is corruption; the same name across
        // layers is the override mechanism.
        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.name.as_str()) {
                return Err(Error::ConfigCorrupt {
                    path,
                    reason: format!("duplicate entry name '{}'", entry.name),
                });
            }
        }
        Ok(entries)
    }

    /// Serialize and write one layer atomically: temp file in the same
    /// directory, then rename. A crash mid-write never corrupts the document.
    pub fn save(&self, layer: Layer, entries: &[SnippetEntry]) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        let path = self.layer_path(layer);
        let tmp = path.with_extension("json.tmp");
        let mut data = serde_json::to_string_pretty(entries).map_err(|e| Error::ConfigCorrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        data.push('\n');
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> SnippetEntry {
        SnippetEntry {
            name: name.into(),
            pattern: format!(r"\b({})\b[.,;:!?]?", name.to_uppercase()),
            content_refs: vec![PathBuf::from(format!("snippets/{name}.md"))],
            separator: "\n".into(),
            enabled: true,
            description: None,
        }
    }

    #[test]
    fn load_missing_documents_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(tmp.path());
        let registry = store.load().unwrap();
        assert!(registry.base.is_empty());
        assert!(registry.local.is_empty());
    }

    #[test]
    fn save_load_round_trip_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(tmp.path());
        store.save(Layer::Local, &[entry("docker"), entry("k8s")]).unwrap();

        let first = store.load().unwrap();
        let on_disk = fs::read_to_string(store.layer_path(Layer::Local)).unwrap();

        store.save(Layer::Local, &first.local).unwrap();
        let second = store.load().unwrap();
        assert_eq!(first.local, second.local);
        assert_eq!(on_disk, fs::read_to_string(store.layer_path(Layer::Local)).unwrap());
    }

    #[test]
    fn save_leaves_no_temp_residue() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(tmp.path());
        store.save(Layer::Base, &[entry("docker")]).unwrap();

        let leftovers: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .flatten()
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn malformed_document_is_corrupt_with_path() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(tmp.path());
        fs::write(store.layer_path(Layer::Base), "{ not json").unwrap();

        match store.load() {
            Err(Error::ConfigCorrupt { path, .. }) => {
                assert_eq!(path, store.layer_path(Layer::Base));
            },
            other => panic!("expected ConfigCorrupt, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_name_in_one_layer_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(tmp.path());
        let doc = serde_json::to_string(&[entry("dup"), entry("dup")]).unwrap();
        fs::write(store.layer_path(Layer::Local), doc).unwrap();

        match store.load() {
            Err(Error::ConfigCorrupt { reason, .. }) => assert!(reason.contains("dup")),
            other => panic!("expected ConfigCorrupt, got {other:?}"),
        }
    }

    #[test]
    fn same_name_across_layers_is_an_override_not_corruption() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(tmp.path());
        store.save(Layer::Base, &[entry("docker")]).unwrap();
        let mut local = entry("docker");
        local.enabled = false;
        store.save(Layer::Local, &[local]).unwrap();

        let registry = store.load().unwrap();
        assert!(!registry.get("docker").unwrap().enabled);
    }

    #[test]
    fn content_paths_resolve_against_root() {
        let store = ConfigStore::new("/var/lib/capsnip");
        assert_eq!(
            store.resolve_content_path(Path::new("snippets/docker.md")),
            PathBuf::from("/var/lib/capsnip/snippets/docker.md")
        );
        assert_eq!(
            store.resolve_content_path(Path::new("/abs/other.md")),
            PathBuf::from("/abs/other.md")
        );
    }
}
