//! The hot path: match enabled triggers against one input and assemble the
//! injection payload.
//!
//! Runs on every user turn, so it is deterministic, linear in the number of
//! enabled entries times the input length, and never errors. A missing or
//! unreadable content file is logged and skipped; it must not suppress the
//! other snippets on the same turn.

use std::fs;

use {regex::Regex, serde::Serialize, tracing::warn};

use crate::{store::ConfigStore, types::Registry};

/// One matched snippet's assembled content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InjectionBlock {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InjectionResult {
    /// Itemized per-entry blocks, for tooling and verification.
    pub blocks: Vec<InjectionBlock>,
    /// The payload the host injects as-is.
    pub combined: String,
}

impl InjectionResult {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Separator between blocks of different entries, independent of each
/// entry's own content separator.
const BLOCK_SEPARATOR: &str = "\n";

/// Match every enabled entry against `input` and concatenate the matching
/// snippets' content in merged-registry order.
///
/// Matching is a case-sensitive regex search: the protocol assumes the user
/// types the trigger in caps, so no folding is applied.
pub fn inject(input: &str, registry: &Registry, store: &ConfigStore) -> InjectionResult {
    let mut blocks = Vec::new();

    for entry in registry.merged() {
        if !entry.enabled {
            continue;
        }
        let regex = match Regex::new(&entry.pattern) {
            Ok(r) => r,
            Err(e) => {
                // One bad entry must not suppress the rest of the turn.
                warn!(name = %entry.name, %e, "trigger pattern does not compile, skipping");
                continue;
            },
        };
        if !regex.is_match(input) {
            continue;
        }

        let mut parts = Vec::new();
        for content_ref in &entry.content_refs {
            let path = store.resolve_content_path(content_ref);
            match fs::read_to_string(&path) {
                Ok(content) => parts.push(content),
                Err(e) => {
                    warn!(name = %entry.name, path = %path.display(), %e, "content file unreadable, skipping");
                },
            }
        }
        if parts.is_empty() {
            continue;
        }
        blocks.push(InjectionBlock {
            name: entry.name.clone(),
            content: parts.join(&entry.separator),
        });
    }

    let combined = blocks
        .iter()
        .map(|block| block.content.as_str())
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR);

    InjectionResult { blocks, combined }
}
