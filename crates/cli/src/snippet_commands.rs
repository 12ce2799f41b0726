//! Handlers translating CLI arguments into engine calls and process I/O.

use std::io::Read;

use {
    anyhow::bail,
    capsnip_engine::{
        Error, SnippetEntry, SnippetService,
        service::{ContentSource, CreateRequest, SearchRank, UpdatePatch},
        validate,
    },
};

use crate::Commands;

pub fn run(service: &SnippetService, command: Commands, json: bool) -> anyhow::Result<()> {
    match command {
        Commands::Create {
            name,
            pattern,
            files,
            content,
            separator,
            disabled,
            description,
            advanced,
        } => {
            let content = match (content, files.is_empty()) {
                (Some(text), _) => ContentSource::Inline(text),
                (None, false) => ContentSource::Refs(files),
                (None, true) => bail!("pass --content or at least one --file"),
            };
            let req = CreateRequest {
                name,
                pattern: pattern.clone(),
                content,
                separator,
                enabled: !disabled,
                description,
                advanced,
            };
            match service.create(req) {
                Ok(entry) => print_entry(&entry, json)?,
                Err(e) => return Err(with_correction_hint(e, &pattern)),
            }
        },

        Commands::List => {
            let entries = service.list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("No snippets configured.");
            } else {
                for entry in &entries {
                    let status = if entry.enabled {
                        "✓"
                    } else {
                        "✗"
                    };
                    println!("  {status} {name} — {pattern}", name = entry.name, pattern = entry.pattern);
                }
            }
        },

        Commands::Show { name } => {
            let entry = service.get(&name)?;
            print_entry(&entry, json)?;
        },

        Commands::Search { query } => {
            let hits = service.search(&query)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else if hits.is_empty() {
                println!("No matches for '{query}'.");
            } else {
                for hit in &hits {
                    println!(
                        "  [{rank}] {name} — {pattern}",
                        rank = rank_label(hit.rank),
                        name = hit.entry.name,
                        pattern = hit.entry.pattern,
                    );
                }
            }
        },

        Commands::Update {
            name,
            pattern,
            files,
            separator,
            enable,
            disable,
            rename,
            description,
            advanced,
        } => {
            let hint = pattern.clone();
            let patch = UpdatePatch {
                pattern,
                content_refs: (!files.is_empty()).then_some(files),
                separator,
                enabled: if enable {
                    Some(true)
                } else if disable {
                    Some(false)
                } else {
                    None
                },
                description,
                rename_to: rename,
                advanced,
            };
            match service.update(&name, patch) {
                Ok(entry) => print_entry(&entry, json)?,
                Err(e) => return Err(with_correction_hint(e, hint.as_deref().unwrap_or_default())),
            }
        },

        Commands::Delete {
            name,
            no_backup,
            remove_content,
        } => {
            let remaining = service.delete(&name, !no_backup, remove_content)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&remaining)?);
            } else {
                println!("Deleted '{name}' ({} remaining).", remaining.len());
            }
        },

        Commands::Validate => {
            let issues = service.validate_all()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&issues)?);
            } else if issues.is_empty() {
                println!("No issues found.");
            } else {
                for issue in &issues {
                    println!("  warning: {issue}");
                }
            }
        },

        Commands::Inject { text } => {
            let raw = match text {
                Some(t) => t,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                },
            };
            let input = extract_prompt(&raw);
            let result = service.inject(&input)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else if !result.is_empty() {
                println!("{}", result.combined);
            }
        },
    }
    Ok(())
}

/// On a protocol rejection, surface the validator's suggested fix (if any)
/// before returning the error, so interactive users can correct and retry.
fn with_correction_hint(e: Error, pattern: &str) -> anyhow::Error {
    if matches!(e, Error::InvalidPattern { .. })
        && let Some(fix) = validate::validate(pattern).normalized
    {
        eprintln!("suggested pattern: {fix}");
    }
    e.into()
}

fn print_entry(entry: &SnippetEntry, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(entry)?);
        return Ok(());
    }
    println!("Name:        {}", entry.name);
    println!("Pattern:     {}", entry.pattern);
    for content_ref in &entry.content_refs {
        println!("Content:     {}", content_ref.display());
    }
    println!("Separator:   {:?}", entry.separator);
    println!("Enabled:     {}", entry.enabled);
    if let Some(ref description) = entry.description {
        println!("Description: {description}");
    }
    Ok(())
}

fn rank_label(rank: SearchRank) -> &'static str {
    match rank {
        SearchRank::ExactName => "name",
        SearchRank::NameSubstring => "name~",
        SearchRank::PatternBody => "pattern",
        SearchRank::Description => "description",
    }
}

/// Host hook events arrive on stdin as a JSON object carrying a `prompt`
/// field; plain text passes through unchanged.
fn extract_prompt(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('{')
        && let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed)
        && let Some(prompt) = value.get("prompt").and_then(|p| p.as_str())
    {
        return prompt.to_string();
    }
    raw.to_string()
}
