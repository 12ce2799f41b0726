//! Transactional CRUD over the layered snippet store.
//!
//! Every mutation follows the same shape: validate, back up if destructive,
//! write through the store, return the new state. The matcher never writes;
//! this service is the only mutation path.

use std::{fmt, fs, path::PathBuf};

use {
    serde::Serialize,
    tracing::{info, warn},
};

use crate::{
    backup::BackupManager,
    error::{Error, Result},
    inject::{self, InjectionResult},
    store::ConfigStore,
    types::{Layer, Registry, SnippetEntry},
    validate::{self, RuleViolation},
};

// ── Requests ────────────────────────────────────────────────────────────────

/// Where a new entry's content comes from.
pub enum ContentSource {
    /// Existing files, referenced in order.
    Refs(Vec<PathBuf>),
    /// Inline text, materialized under `snippets/<name>.md` before the entry
    /// is registered. Content and config metadata stay separate artifacts.
    Inline(String),
}

pub struct CreateRequest {
    pub name: String,
    pub pattern: String,
    pub content: ContentSource,
    pub separator: Option<String>,
    pub enabled: bool,
    pub description: Option<String>,
    /// Use the advanced validation path for complex regex bodies.
    pub advanced: bool,
}

/// Partial update: unset fields keep their prior values.
#[derive(Default)]
pub struct UpdatePatch {
    pub pattern: Option<String>,
    pub content_refs: Option<Vec<PathBuf>>,
    pub separator: Option<String>,
    pub enabled: Option<bool>,
    pub description: Option<String>,
    pub rename_to: Option<String>,
    pub advanced: bool,
}

// ── Search ──────────────────────────────────────────────────────────────────

/// Match locus, best first. Ties keep registry order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchRank {
    ExactName,
    NameSubstring,
    PatternBody,
    Description,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub rank: SearchRank,
    #[serde(flatten)]
    pub entry: SnippetEntry,
}

// ── Validation sweep ────────────────────────────────────────────────────────

/// A finding from [`SnippetService::validate_all`]. Reported, never acted on.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ValidationIssue {
    InvalidPattern {
        name: String,
        violations: Vec<RuleViolation>,
    },
    DanglingContentRef {
        name: String,
        path: PathBuf,
    },
    /// Same name in both layers: the documented override mechanism, surfaced
    /// so users can see why a base edit has no effect.
    ShadowedByLocal {
        name: String,
    },
    /// Two enabled entries whose literal alternative sets are subset,
    /// superset, or equal. Both may legitimately fire together; this is a
    /// best-effort warning, not an error.
    OverlappingAlternatives {
        name: String,
        other: String,
        shared: Vec<String>,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPattern { name, violations } => {
                let rules = violations
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                write!(f, "'{name}': invalid pattern ({rules})")
            },
            Self::DanglingContentRef { name, path } => {
                write!(f, "'{name}': content file missing: {}", path.display())
            },
            Self::ShadowedByLocal { name } => {
                write!(f, "'{name}': base entry shadowed by local layer")
            },
            Self::OverlappingAlternatives { name, other, shared } => {
                write!(
                    f,
                    "'{name}' and '{other}' share trigger keywords: {}",
                    shared.join(", ")
                )
            },
        }
    }
}

// ── Service ─────────────────────────────────────────────────────────────────

pub struct SnippetService {
    store: ConfigStore,
    backups: BackupManager,
}

impl SnippetService {
    /// Backups default to `<store root>/backups/`.
    pub fn new(store: ConfigStore) -> Self {
        let backups = BackupManager::new(store.root().join("backups"));
        Self { store, backups }
    }

    pub fn with_backups(store: ConfigStore, backups: BackupManager) -> Self {
        Self { store, backups }
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    // ── Create ──────────────────────────────────────────────────────────

    pub fn create(&self, req: CreateRequest) -> Result<SnippetEntry> {
        let registry = self.store.load()?;
        if registry.contains(&req.name) {
            return Err(Error::DuplicateName(req.name));
        }
        let pattern = self.check_pattern(&req.pattern, req.advanced)?;

        let content_refs = match req.content {
            ContentSource::Refs(refs) => refs,
            ContentSource::Inline(text) => {
                let rel = PathBuf::from("snippets").join(format!("{}.md", req.name));
                let dest = self.store.resolve_content_path(&rel);
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&dest, text)?;
                vec![rel]
            },
        };

        let entry = SnippetEntry {
            name: req.name,
            pattern,
            content_refs,
            separator: req.separator.unwrap_or_else(|| "\n".to_string()),
            enabled: req.enabled,
            description: req.description,
        };

        let mut local = registry.local;
        local.push(entry.clone());
        self.store.save(Layer::Local, &local)?;
        info!(name = %entry.name, "snippet created");
        Ok(entry)
    }

    // ── Read ────────────────────────────────────────────────────────────

    pub fn get(&self, name: &str) -> Result<SnippetEntry> {
        let registry = self.store.load()?;
        registry
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// The full merged registry, enabled and disabled entries alike.
    pub fn list(&self) -> Result<Vec<SnippetEntry>> {
        let registry = self.store.load()?;
        Ok(registry.merged().into_iter().cloned().collect())
    }

    /// Ranked search: exact name > name substring > pattern body substring >
    /// description substring. Case-insensitive; ties keep registry order.
    pub fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let registry = self.store.load()?;
        let needle = query.to_lowercase();

        let mut hits = Vec::new();
        for entry in registry.merged() {
            let rank = if entry.name.eq_ignore_ascii_case(query) {
                SearchRank::ExactName
            } else if entry.name.to_lowercase().contains(&needle) {
                SearchRank::NameSubstring
            } else if validate::pattern_body(&entry.pattern)
                .is_some_and(|body| body.to_lowercase().contains(&needle))
            {
                SearchRank::PatternBody
            } else if entry
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle))
            {
                SearchRank::Description
            } else {
                continue;
            };
            hits.push(SearchHit {
                rank,
                entry: entry.clone(),
            });
        }
        // Stable sort: equal ranks keep merged-registry order.
        hits.sort_by_key(|hit| hit.rank);
        Ok(hits)
    }

    // ── Update ──────────────────────────────────────────────────────────

    /// Merge-not-replace: only the patch's set fields change. A new pattern
    /// is re-validated before anything is written, and a backup of the
    /// current state is taken first.
    pub fn update(&self, name: &str, patch: UpdatePatch) -> Result<SnippetEntry> {
        let registry = self.store.load()?;
        let current = registry
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        let new_pattern = match &patch.pattern {
            Some(p) => Some(self.check_pattern(p, patch.advanced)?),
            None => None,
        };
        if let Some(rename) = &patch.rename_to
            && rename != name
            && registry.contains(rename)
        {
            return Err(Error::DuplicateName(rename.clone()));
        }

        self.backups.backup(&current, &self.store)?;

        let mut updated = current;
        if let Some(pattern) = new_pattern {
            updated.pattern = pattern;
        }
        if let Some(refs) = patch.content_refs {
            updated.content_refs = refs;
        }
        if let Some(separator) = patch.separator {
            updated.separator = separator;
        }
        if let Some(enabled) = patch.enabled {
            updated.enabled = enabled;
        }
        if let Some(description) = patch.description {
            updated.description = Some(description);
        }
        if let Some(rename) = patch.rename_to {
            updated.name = rename;
        }

        // Rewrite every layer holding the entry so a stale base copy cannot
        // diverge from the local override.
        self.replace_in_layers(&registry, name, Some(&updated))?;
        info!(name = %name, new_name = %updated.name, "snippet updated");
        Ok(updated)
    }

    // ── Delete ──────────────────────────────────────────────────────────

    /// Removes the entry from every layer holding it. The backup (default on)
    /// must complete first; a failed backup aborts the delete.
    pub fn delete(
        &self,
        name: &str,
        backup: bool,
        remove_content: bool,
    ) -> Result<Vec<SnippetEntry>> {
        let registry = self.store.load()?;
        let current = registry
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        if backup {
            self.backups.backup(&current, &self.store)?;
        }

        self.replace_in_layers(&registry, name, None)?;

        if remove_content {
            for content_ref in &current.content_refs {
                let path = self.store.resolve_content_path(content_ref);
                if let Err(e) = fs::remove_file(&path) {
                    warn!(path = %path.display(), %e, "could not remove content file");
                }
            }
        }

        info!(name = %name, "snippet deleted");
        self.list()
    }

    // ── Validation sweep ────────────────────────────────────────────────

    /// Walk the merged registry and report problems without mutating.
    pub fn validate_all(&self) -> Result<Vec<ValidationIssue>> {
        let registry = self.store.load()?;
        let merged = registry.merged();
        let mut issues = Vec::new();

        for entry in &merged {
            // Entries created through the advanced path are legal too.
            let strict = validate::validate(&entry.pattern);
            if !strict.ok && !validate::validate_advanced(&entry.pattern).ok {
                issues.push(ValidationIssue::InvalidPattern {
                    name: entry.name.clone(),
                    violations: strict.violations,
                });
            }
            for content_ref in &entry.content_refs {
                let path = self.store.resolve_content_path(content_ref);
                if !path.is_file() {
                    issues.push(ValidationIssue::DanglingContentRef {
                        name: entry.name.clone(),
                        path,
                    });
                }
            }
        }

        for base_entry in &registry.base {
            if registry.local.iter().any(|l| l.name == base_entry.name) {
                issues.push(ValidationIssue::ShadowedByLocal {
                    name: base_entry.name.clone(),
                });
            }
        }

        let alternative_sets: Vec<_> = merged
            .iter()
            .filter(|entry| entry.enabled)
            .filter_map(|entry| {
                validate::pattern_body(&entry.pattern)
                    .and_then(validate::literal_alternatives)
                    .map(|set| (entry.name.clone(), set))
            })
            .collect();
        for (i, (name, set)) in alternative_sets.iter().enumerate() {
            for (other, other_set) in alternative_sets.iter().skip(i + 1) {
                if set.is_subset(other_set) || other_set.is_subset(set) {
                    issues.push(ValidationIssue::OverlappingAlternatives {
                        name: name.clone(),
                        other: other.clone(),
                        shared: set.intersection(other_set).cloned().collect(),
                    });
                }
            }
        }

        Ok(issues)
    }

    // ── Injection convenience ───────────────────────────────────────────

    /// Load the registry and run the matcher in one call; the hook path.
    pub fn inject(&self, input: &str) -> Result<InjectionResult> {
        let registry = self.store.load()?;
        Ok(inject::inject(input, &registry, &self.store))
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn check_pattern(&self, pattern: &str, advanced: bool) -> Result<String> {
        let validation = if advanced {
            validate::validate_advanced(pattern)
        } else {
            validate::validate(pattern)
        };
        if validation.ok {
            Ok(validation
                .normalized
                .unwrap_or_else(|| pattern.trim().to_string()))
        } else {
            Err(Error::InvalidPattern {
                pattern: pattern.to_string(),
                violations: validation.violations,
            })
        }
    }

    /// Replace (or, with `None`, remove) the named entry in every layer
    /// document that holds it, saving each touched layer atomically.
    fn replace_in_layers(
        &self,
        registry: &Registry,
        name: &str,
        replacement: Option<&SnippetEntry>,
    ) -> Result<()> {
        for layer in registry.layers_of(name) {
            let entries = match layer {
                Layer::Base => &registry.base,
                Layer::Local => &registry.local,
            };
            let next: Vec<SnippetEntry> = entries
                .iter()
                .filter_map(|entry| {
                    if entry.name == name {
                        replacement.cloned()
                    } else {
                        Some(entry.clone())
                    }
                })
                .collect();
            self.store.save(layer, &next)?;
        }
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::validate::RuleViolation, std::path::Path};

    fn service(root: &Path) -> SnippetService {
        SnippetService::new(ConfigStore::new(root))
    }

    fn create_req(name: &str, pattern: &str, content: &str) -> CreateRequest {
        CreateRequest {
            name: name.into(),
            pattern: pattern.into(),
            content: ContentSource::Inline(content.into()),
            separator: None,
            enabled: true,
            description: None,
            advanced: false,
        }
    }

    #[test]
    fn create_materializes_inline_content() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());

        let entry = svc
            .create(create_req("docker", r"\b(DOCKER)\b[.,;:!?]?", "Use multi-stage builds."))
            .unwrap();
        assert_eq!(entry.content_refs, vec![PathBuf::from("snippets/docker.md")]);
        assert_eq!(
            fs::read_to_string(tmp.path().join("snippets/docker.md")).unwrap(),
            "Use multi-stage builds."
        );
        assert_eq!(svc.list().unwrap().len(), 1);
    }

    #[test]
    fn create_rejects_duplicate_names() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());
        svc.create(create_req("docker", r"\b(DOCKER)\b[.,;:!?]?", "x")).unwrap();

        let err = svc
            .create(create_req("docker", r"\b(OCI)\b[.,;:!?]?", "y"))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateName(name) if name == "docker"));
    }

    #[test]
    fn invalid_pattern_creates_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());

        let err = svc.create(create_req("x", r"\b(docker)\b[.,;:!?]?", "body")).unwrap_err();
        match err {
            Error::InvalidPattern { violations, .. } => {
                assert!(violations.contains(&RuleViolation::ContainsLowercase));
            },
            other => panic!("expected InvalidPattern, got {other:?}"),
        }
        assert!(svc.list().unwrap().is_empty());
        assert!(svc.get("x").is_err());
    }

    #[test]
    fn update_merges_partial_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());
        let created = svc
            .create(create_req("docker", r"\b(DOCKER)\b[.,;:!?]?", "body"))
            .unwrap();

        let updated = svc
            .update("docker", UpdatePatch {
                enabled: Some(false),
                ..Default::default()
            })
            .unwrap();
        assert!(!updated.enabled);
        // Everything else kept: merge, not replace.
        assert_eq!(updated.pattern, created.pattern);
        assert_eq!(updated.content_refs, created.content_refs);
    }

    #[test]
    fn update_rejects_invalid_pattern_and_keeps_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());
        svc.create(create_req("docker", r"\b(DOCKER)\b[.,;:!?]?", "body")).unwrap();

        let err = svc
            .update("docker", UpdatePatch {
                pattern: Some(r"\b(lower)\b[.,;:!?]?".into()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { .. }));
        assert_eq!(svc.get("docker").unwrap().pattern, r"\b(DOCKER)\b[.,;:!?]?");
    }

    #[test]
    fn rename_collision_fails_and_leaves_entry_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());
        svc.create(create_req("a", r"\b(AAA)\b[.,;:!?]?", "a")).unwrap();
        svc.create(create_req("b", r"\b(BBB)\b[.,;:!?]?", "b")).unwrap();

        let err = svc
            .update("a", UpdatePatch {
                rename_to: Some("b".into()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateName(name) if name == "b"));
        // `a` unchanged on disk.
        assert_eq!(svc.get("a").unwrap().pattern, r"\b(AAA)\b[.,;:!?]?");
    }

    #[test]
    fn update_backs_up_pre_mutation_state() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());
        svc.create(create_req("docker", r"\b(DOCKER)\b[.,;:!?]?", "body")).unwrap();
        let before = fs::read_to_string(tmp.path().join("snippets.local.json")).unwrap();

        svc.update("docker", UpdatePatch {
            enabled: Some(false),
            ..Default::default()
        })
        .unwrap();

        let backups: Vec<_> = fs::read_dir(tmp.path().join("backups")).unwrap().flatten().collect();
        assert_eq!(backups.len(), 1);
        let snapshot =
            fs::read_to_string(backups[0].path().join("snippets.local.json")).unwrap();
        assert_eq!(snapshot, before);
    }

    #[test]
    fn delete_backs_up_then_returns_remaining() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());
        svc.create(create_req("docker", r"\b(DOCKER)\b[.,;:!?]?", "d")).unwrap();
        svc.create(create_req("k8s", r"\b(K8S)\b[.,;:!?]?", "k")).unwrap();

        let remaining = svc.delete("docker", true, false).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "k8s");
        assert!(fs::read_dir(tmp.path().join("backups")).unwrap().flatten().count() == 1);
        // Content file retained unless removal requested.
        assert!(tmp.path().join("snippets/docker.md").exists());
    }

    #[test]
    fn delete_can_remove_content_files() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());
        svc.create(create_req("docker", r"\b(DOCKER)\b[.,;:!?]?", "d")).unwrap();

        svc.delete("docker", true, true).unwrap();
        assert!(!tmp.path().join("snippets/docker.md").exists());
    }

    #[test]
    fn failed_backup_aborts_the_mutation() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());
        svc.create(create_req("docker", r"\b(DOCKER)\b[.,;:!?]?", "body")).unwrap();
        // Occupy the backups root with a plain file so no snapshot can be
        // created: fail-closed, the destructive operation must not proceed.
        fs::write(tmp.path().join("backups"), "not a directory").unwrap();

        let err = svc.delete("docker", true, false).unwrap_err();
        assert!(matches!(err, Error::BackupFailed { .. }), "{err:?}");
        assert!(svc.get("docker").is_ok());

        let err = svc
            .update("docker", UpdatePatch {
                enabled: Some(false),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::BackupFailed { .. }), "{err:?}");
        // Entry untouched on disk.
        assert!(svc.get("docker").unwrap().enabled);
    }

    #[test]
    fn delete_unknown_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());
        assert!(matches!(svc.delete("ghost", true, false), Err(Error::NotFound(_))));
    }

    #[test]
    fn delete_removes_entry_from_both_layers() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(tmp.path());
        let entry = SnippetEntry {
            name: "shared".into(),
            pattern: r"\b(SHARED)\b[.,;:!?]?".into(),
            content_refs: vec![],
            separator: "\n".into(),
            enabled: true,
            description: None,
        };
        store.save(Layer::Base, std::slice::from_ref(&entry)).unwrap();
        store.save(Layer::Local, std::slice::from_ref(&entry)).unwrap();

        let svc = SnippetService::new(store);
        let remaining = svc.delete("shared", false, false).unwrap();
        assert!(remaining.is_empty());
        let registry = svc.store().load().unwrap();
        assert!(registry.base.is_empty());
        assert!(registry.local.is_empty());
    }

    #[test]
    fn search_ranks_by_match_locus() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());
        // Description mentions docker; name does not.
        let mut req = create_req("compose", r"\b(COMPOSE)\b[.,;:!?]?", "c");
        req.description = Some("docker compose tips".into());
        svc.create(req).unwrap();
        // Pattern body mentions DOCKERFILE.
        svc.create(create_req("builds", r"\b(DOCKERFILE)\b[.,;:!?]?", "b")).unwrap();
        // Name substring.
        svc.create(create_req("docker-swarm", r"\b(SWARM)\b[.,;:!?]?", "s")).unwrap();
        // Exact name.
        svc.create(create_req("docker", r"\b(MOBY)\b[.,;:!?]?", "d")).unwrap();

        let hits = svc.search("docker").unwrap();
        let names: Vec<_> = hits.iter().map(|h| h.entry.name.as_str()).collect();
        assert_eq!(names, ["docker", "docker-swarm", "builds", "compose"]);
        assert_eq!(hits[0].rank, SearchRank::ExactName);
        assert_eq!(hits[3].rank, SearchRank::Description);
    }

    #[test]
    fn validate_all_reports_dangling_and_overlap() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());
        svc.create(create_req("docker", r"\b(DOCKER|CONTAINER)\b[.,;:!?]?", "d")).unwrap();
        svc.create(create_req("oci", r"\b(CONTAINER)\b[.,;:!?]?", "o")).unwrap();
        fs::remove_file(tmp.path().join("snippets/oci.md")).unwrap();

        let issues = svc.validate_all().unwrap();
        assert!(issues.iter().any(|i| matches!(
            i,
            ValidationIssue::DanglingContentRef { name, .. } if name == "oci"
        )));
        assert!(issues.iter().any(|i| matches!(
            i,
            ValidationIssue::OverlappingAlternatives { name, other, shared }
                if name == "docker" && other == "oci" && shared == &["CONTAINER".to_string()]
        )));
    }

    #[test]
    fn validate_all_reports_shadowing_but_accepts_advanced_patterns() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(tmp.path());
        let base = SnippetEntry {
            name: "adv".into(),
            pattern: r"\b(DOCKER[A-Z]*)\b[.,;:!?]?".into(),
            content_refs: vec![],
            separator: "\n".into(),
            enabled: true,
            description: None,
        };
        store.save(Layer::Base, std::slice::from_ref(&base)).unwrap();
        store.save(Layer::Local, std::slice::from_ref(&base)).unwrap();

        let issues = SnippetService::new(store).validate_all().unwrap();
        assert!(issues.iter().any(|i| matches!(
            i,
            ValidationIssue::ShadowedByLocal { name } if name == "adv"
        )));
        // Advanced-shaped pattern is not reported as invalid.
        assert!(!issues.iter().any(|i| matches!(i, ValidationIssue::InvalidPattern { .. })));
    }

    #[test]
    fn validate_all_skips_disabled_entries_for_overlap() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());
        svc.create(create_req("a", r"\b(DOCKER)\b[.,;:!?]?", "a")).unwrap();
        let mut req = create_req("b", r"\b(DOCKER)\b[.,;:!?]?", "b");
        req.enabled = false;
        svc.create(req).unwrap();

        let issues = svc.validate_all().unwrap();
        assert!(!issues.iter().any(|i| matches!(
            i,
            ValidationIssue::OverlappingAlternatives { .. }
        )));
    }
}
