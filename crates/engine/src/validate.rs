//! Trigger pattern protocol enforcement.
//!
//! Accepted triggers have the shape `\b(<BODY>)\b[<PUNCT>]?`: a single
//! capturing group of uppercase keyword alternatives framed by word
//! boundaries, followed by an optional punctuation class. The validator is
//! pure (no I/O) and is the only place the protocol is encoded; every
//! mutation path goes through it.

use std::{collections::BTreeSet, fmt};

use {regex::Regex, serde::Serialize};

/// The default punctuation class appended to protocol patterns.
pub const DEFAULT_PUNCT_CLASS: &str = "[.,;:!?]?";

/// Characters the punctuation class must cover at minimum.
const REQUIRED_PUNCT: &[char] = &['.', ',', ';', ':', '!', '?'];

const GROUP_OPEN: &str = r"\b(";
const GROUP_CLOSE: &str = r")\b";

// ── Violations ──────────────────────────────────────────────────────────────

/// A specific protocol rule broken by a candidate pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleViolation {
    MissingWordBoundary,
    NotSingleGroup,
    ContainsLowercase,
    SpaceNotAllowed,
    MixedSeparators,
    EmptyAlternative,
    MissingPunctuationClass,
    IncompletePunctuation,
    UnsupportedConstruct(char),
    Uncompilable(String),
}

impl fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingWordBoundary => write!(f, "missing word boundary (`\\b`)"),
            Self::NotSingleGroup => {
                write!(f, "alternatives must sit in a single capturing group")
            },
            Self::ContainsLowercase => write!(f, "contains lowercase; keywords are uppercase"),
            Self::SpaceNotAllowed => write!(f, "space not allowed; use `_`"),
            Self::MixedSeparators => write!(f, "mixed separators; use `_` or `-`, not both"),
            Self::EmptyAlternative => write!(f, "empty keyword alternative"),
            Self::MissingPunctuationClass => {
                write!(f, "missing punctuation class `{DEFAULT_PUNCT_CLASS}` after `)\\b`")
            },
            Self::IncompletePunctuation => {
                write!(f, "punctuation class must cover at least `.,;:!?`")
            },
            Self::UnsupportedConstruct(c) => {
                write!(f, "unsupported construct {c:?}; pass --advanced for complex bodies")
            },
            Self::Uncompilable(e) => write!(f, "pattern does not compile: {e}"),
        }
    }
}

/// Outcome of validating one candidate pattern.
///
/// `normalized` is the pattern to store when `ok`. When the only violation is
/// the missing punctuation class, `normalized` instead carries the suggested
/// corrected pattern so interactive callers can offer a one-key fix.
#[derive(Debug, Clone)]
pub struct Validation {
    pub ok: bool,
    pub normalized: Option<String>,
    pub violations: Vec<RuleViolation>,
}

// ── Validation paths ────────────────────────────────────────────────────────

/// Validate a pattern against the full protocol (the default path).
pub fn validate(pattern: &str) -> Validation {
    let p = pattern.trim();
    let mut violations = Vec::new();

    let Some((body, tail)) = split_frame(p, &mut violations) else {
        return Validation {
            ok: false,
            normalized: None,
            violations,
        };
    };

    check_body(body, &mut violations);
    check_punct_tail(tail, &mut violations);

    if violations.is_empty()
        && let Err(e) = Regex::new(p)
    {
        violations.push(RuleViolation::Uncompilable(e.to_string()));
    }

    let ok = violations.is_empty();
    let normalized = if ok {
        Some(p.to_string())
    } else if violations == [RuleViolation::MissingPunctuationClass] {
        Some(format!("{GROUP_OPEN}{body}{GROUP_CLOSE}{DEFAULT_PUNCT_CLASS}"))
    } else {
        None
    };

    Validation {
        ok,
        normalized,
        violations,
    }
}

/// The flagged exception path for complex regex bodies: the `\b(...)\b` frame
/// is still required and the pattern must compile, but the body is otherwise
/// unrestricted.
pub fn validate_advanced(pattern: &str) -> Validation {
    let p = pattern.trim();
    let mut violations = Vec::new();

    if !(p.starts_with(GROUP_OPEN) && p.contains(GROUP_CLOSE)) {
        violations.push(RuleViolation::MissingWordBoundary);
    }
    if let Err(e) = Regex::new(p) {
        violations.push(RuleViolation::Uncompilable(e.to_string()));
    }

    let ok = violations.is_empty();
    Validation {
        ok,
        normalized: ok.then(|| p.to_string()),
        violations,
    }
}

// ── Body inspection helpers ─────────────────────────────────────────────────

/// Extract the group body of a framed pattern, if any.
pub fn pattern_body(pattern: &str) -> Option<&str> {
    let rest = pattern.trim().strip_prefix(GROUP_OPEN)?;
    let idx = rest.rfind(GROUP_CLOSE)?;
    Some(&rest[..idx])
}

/// The set of literal keyword alternatives in a protocol-shaped body.
///
/// Returns `None` for bodies carrying any non-literal construct; those are
/// never compared by the overlap heuristic.
pub fn literal_alternatives(body: &str) -> Option<BTreeSet<String>> {
    if body.is_empty()
        || !body
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '|' | '_' | '-'))
    {
        return None;
    }
    Some(
        body.split('|')
            .filter(|alt| !alt.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

fn split_frame<'a>(p: &'a str, violations: &mut Vec<RuleViolation>) -> Option<(&'a str, &'a str)> {
    if !p.starts_with(r"\b") {
        violations.push(RuleViolation::MissingWordBoundary);
        return None;
    }
    let Some(rest) = p.strip_prefix(GROUP_OPEN) else {
        violations.push(RuleViolation::NotSingleGroup);
        return None;
    };
    let Some(idx) = rest.rfind(GROUP_CLOSE) else {
        violations.push(RuleViolation::MissingWordBoundary);
        return None;
    };
    Some((&rest[..idx], &rest[idx + GROUP_CLOSE.len()..]))
}

fn check_body(body: &str, violations: &mut Vec<RuleViolation>) {
    let mut underscore = false;
    let mut hyphen = false;

    for c in body.chars() {
        match c {
            'A'..='Z' | '0'..='9' | '|' => {},
            '_' => underscore = true,
            '-' => hyphen = true,
            ' ' => push_once(violations, RuleViolation::SpaceNotAllowed),
            'a'..='z' => push_once(violations, RuleViolation::ContainsLowercase),
            '(' | ')' => push_once(violations, RuleViolation::NotSingleGroup),
            other => push_once(violations, RuleViolation::UnsupportedConstruct(other)),
        }
    }

    if underscore && hyphen {
        violations.push(RuleViolation::MixedSeparators);
    }
    if body.is_empty() || body.split('|').any(str::is_empty) {
        violations.push(RuleViolation::EmptyAlternative);
    }
}

fn check_punct_tail(tail: &str, violations: &mut Vec<RuleViolation>) {
    if tail.is_empty() {
        violations.push(RuleViolation::MissingPunctuationClass);
        return;
    }
    let Some(inner) = tail.strip_prefix('[').and_then(|t| t.strip_suffix("]?")) else {
        violations.push(RuleViolation::MissingPunctuationClass);
        return;
    };
    if REQUIRED_PUNCT.iter().any(|c| !inner.contains(*c)) {
        violations.push(RuleViolation::IncompletePunctuation);
    }
}

fn push_once(violations: &mut Vec<RuleViolation>, violation: RuleViolation) {
    if !violations.contains(&violation) {
        violations.push(violation);
    }
}
