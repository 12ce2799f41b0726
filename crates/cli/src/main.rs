mod snippet_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use capsnip_engine::{ConfigStore, SnippetService, paths};

#[derive(Parser)]
#[command(name = "capsnip", about = "capsnip — pattern-triggered context snippets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Machine-parseable output for every command.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    /// Store root (layer documents, snippets/, backups/).
    #[arg(long, global = true, env = "CAPSNIP_CONFIG_DIR")]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a snippet entry.
    Create {
        /// Unique entry name.
        name: String,
        /// Trigger pattern, protocol form `\b(KEYWORD|...)\b[.,;:!?]?`.
        pattern: String,
        /// Existing content file(s), injected in order. Repeatable.
        #[arg(long = "file")]
        files: Vec<PathBuf>,
        /// Inline content, written to snippets/<name>.md.
        #[arg(long, conflicts_with = "files")]
        content: Option<String>,
        /// Separator between this entry's content files.
        #[arg(long)]
        separator: Option<String>,
        /// Create the entry disabled.
        #[arg(long)]
        disabled: bool,
        /// Free-text description, searchable.
        #[arg(long)]
        description: Option<String>,
        /// Allow complex regex bodies (the validation exception path).
        #[arg(long)]
        advanced: bool,
    },
    /// List every entry in the merged registry.
    List,
    /// Show one entry.
    Show {
        /// Entry name.
        name: String,
    },
    /// Ranked search over names, patterns, and descriptions.
    Search {
        /// Query string.
        query: String,
    },
    /// Update fields of an entry; unset fields keep their values.
    Update {
        /// Entry name.
        name: String,
        /// New trigger pattern (re-validated).
        #[arg(long)]
        pattern: Option<String>,
        /// Replace the content file list. Repeatable.
        #[arg(long = "file")]
        files: Vec<PathBuf>,
        /// New separator.
        #[arg(long)]
        separator: Option<String>,
        /// Enable the entry.
        #[arg(long, conflicts_with = "disable")]
        enable: bool,
        /// Disable the entry.
        #[arg(long)]
        disable: bool,
        /// Rename the entry.
        #[arg(long)]
        rename: Option<String>,
        /// New description.
        #[arg(long)]
        description: Option<String>,
        /// Allow complex regex bodies for the new pattern.
        #[arg(long)]
        advanced: bool,
    },
    /// Delete an entry (backed up first unless --no-backup).
    Delete {
        /// Entry name.
        name: String,
        /// Skip the pre-delete backup.
        #[arg(long)]
        no_backup: bool,
        /// Also delete the entry's content files.
        #[arg(long)]
        remove_content: bool,
    },
    /// Check every entry: patterns, content refs, shadowing, overlaps.
    Validate,
    /// Match input against enabled triggers and print the injection payload.
    ///
    /// With no argument, reads stdin: either raw text or a host hook event
    /// (JSON object with a `prompt` field).
    Inject {
        /// Input text; omit to read stdin.
        text: Option<String>,
    },
}

/// Logs go to stderr: `inject` prints its payload on stdout and the host
/// consumes it as-is.
fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_telemetry(&cli);

    let root = cli.config_dir.clone().unwrap_or_else(paths::default_root);
    tracing::debug!(root = %root.display(), "using store root");
    let service = SnippetService::new(ConfigStore::new(root));

    snippet_commands::run(&service, cli.command, cli.json)
}
