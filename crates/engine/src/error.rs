use std::path::PathBuf;

use thiserror::Error;

use crate::validate::RuleViolation;

#[derive(Error, Debug)]
pub enum Error {
    /// The trigger pattern fails the authoring protocol. Carries the specific
    /// violated rules so callers can drive an interactive correction flow.
    #[error("pattern {pattern:?} rejected: {}", format_violations(.violations))]
    InvalidPattern {
        pattern: String,
        violations: Vec<RuleViolation>,
    },

    #[error("snippet '{0}' already exists")]
    DuplicateName(String),

    #[error("snippet '{0}' not found")]
    NotFound(String),

    /// A layer document failed to parse. Never auto-repaired: the offending
    /// file is named and the operation stops before any entry can be dropped.
    #[error("config document {} is corrupt: {reason}", .path.display())]
    ConfigCorrupt { path: PathBuf, reason: String },

    /// The pre-mutation snapshot could not be completed. The destructive
    /// operation that requested it must abort.
    #[error("backup for '{name}' failed: {source}")]
    BackupFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

fn format_violations(violations: &[RuleViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
