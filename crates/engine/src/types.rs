use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

// ── Snippet entry ───────────────────────────────────────────────────────────

/// One pattern-triggered snippet: the unit of configuration.
///
/// Field names are the wire contract shared by the config documents, the
/// CRUD service, and the matcher; they stay camelCase on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnippetEntry {
    /// Unique identifier, the stable key across layers.
    pub name: String,
    /// Trigger regex, protocol form `\b(KEYWORD|...)\b[.,;:!?]?`.
    pub pattern: String,
    /// Files injected verbatim when the pattern matches, in order.
    /// Relative paths resolve against the store root.
    #[serde(default)]
    pub content_refs: Vec<PathBuf>,
    /// Joins multiple content refs within this entry.
    #[serde(default = "default_separator")]
    pub separator: String,
    /// Disabled entries are retained but never matched.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Free-text description, searchable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_separator() -> String {
    "\n".to_string()
}

fn default_enabled() -> bool {
    true
}

// ── Layers ──────────────────────────────────────────────────────────────────

/// Two-tier configuration precedence: local overrides base by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    /// Versioned, shared document. Written only on explicit opt-in.
    Base,
    /// User-local document, the default write target.
    Local,
}

impl Layer {
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Base => "snippets.json",
            Self::Local => "snippets.local.json",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base => write!(f, "base"),
            Self::Local => write!(f, "local"),
        }
    }
}

// ── Registry ────────────────────────────────────────────────────────────────

/// Both layer documents as loaded, with the merged view derived on demand.
///
/// Merge order is significant: base entries first (a local entry with the
/// same name replaces the base one in place), then local-only additions in
/// file order. The matcher injects blocks in exactly this order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    pub base: Vec<SnippetEntry>,
    pub local: Vec<SnippetEntry>,
}

impl Registry {
    /// The merged, read-only view consumed by the matcher.
    pub fn merged(&self) -> Vec<&SnippetEntry> {
        let mut out: Vec<&SnippetEntry> = Vec::new();
        for entry in &self.base {
            let winner = self
                .local
                .iter()
                .find(|local| local.name == entry.name)
                .unwrap_or(entry);
            out.push(winner);
        }
        for local in &self.local {
            if !self.base.iter().any(|base| base.name == local.name) {
                out.push(local);
            }
        }
        out
    }

    /// Look up a name in the merged view.
    pub fn get(&self, name: &str) -> Option<&SnippetEntry> {
        self.merged().into_iter().find(|e| e.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Which layer documents hold an entry with this name.
    pub fn layers_of(&self, name: &str) -> Vec<Layer> {
        let mut layers = Vec::new();
        if self.base.iter().any(|e| e.name == name) {
            layers.push(Layer::Base);
        }
        if self.local.iter().any(|e| e.name == name) {
            layers.push(Layer::Local);
        }
        layers
    }
}
