//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use docsync_core::pipeline::{BuildOptions, BuildResult, ProgressReporter, build};
use docsync_diffing::{ChangelogWriter, SnapshotStore, diff_snapshots};
use docsync_output::KbWriter;
use docsync_shared::{AppConfig, load_config, load_config_from};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// docsync — one canonical knowledge base from many documentation sources.
#[derive(Parser)]
#[command(
    name = "docsync",
    version,
    about = "Reconcile API documentation sources into a canonical knowledge base with a classified changelog.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file path (defaults to ~/.docsync/docsync.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the full knowledge-base build pipeline.
    Build {
        /// Bypass all caches and fetch fresh data.
        #[arg(long)]
        force_refresh: bool,

        /// Skip the headless browser; dynamic pages get fallbacks.
        #[arg(long)]
        skip_dynamic: bool,

        /// Output directory (overrides config).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Incremental build: reuse caches, report the diff.
    Update {
        /// Output directory (overrides config).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Regenerate the changelog from all stored snapshots.
    Changelog,

    /// Diff two snapshot files.
    Diff {
        /// Older snapshot path.
        #[arg(long)]
        old: PathBuf,

        /// Newer snapshot path.
        #[arg(long)]
        new: PathBuf,
    },

    /// Validate knowledge-base integrity.
    Validate,

    /// Show build status and statistics.
    Status,
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

pub(crate) fn init_tracing(cli: &Cli) {
    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("docsync={level}")));

    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = match cli.config {
        Some(ref path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Command::Build {
            force_refresh,
            skip_dynamic,
            out,
        } => {
            let mut options = resolve_options(config, out);
            options.fetch.force_refresh = force_refresh;
            options.fetch.skip_dynamic = skip_dynamic;
            run_build(options).await
        }
        Command::Update { out } => {
            let options = resolve_options(config, out);
            let snapshots = SnapshotStore::new(&options.snapshot_dir)?;
            if snapshots.load_latest()?.is_none() {
                warn!("no previous snapshot; this update is an initial build");
            }
            run_build(options).await
        }
        Command::Changelog => regenerate_changelog(&config),
        Command::Diff { old, new } => print_diff(&config, &old, &new),
        Command::Validate => {
            let writer = KbWriter::new(&config.defaults.output_dir)?;
            writer.validate()?;
            println!("✓ knowledge base at {} is valid", config.defaults.output_dir);
            Ok(())
        }
        Command::Status => print_status(&config),
    }
}

fn resolve_options(config: AppConfig, out: Option<PathBuf>) -> BuildOptions {
    let mut options = BuildOptions::from_config(config);
    if let Some(out) = out {
        options.output_dir = out;
    }
    options
}

async fn run_build(options: BuildOptions) -> Result<()> {
    let progress = SpinnerProgress::new();
    let result = build(&options, &progress, None).await?;

    println!(
        "✓ built {} pages ({} endpoints) in {:.2}s",
        result.page_count,
        result.endpoint_count,
        result.elapsed.as_secs_f64()
    );
    println!(
        "  {} added, {} modified, {} removed, {} unchanged",
        result.stats.added, result.stats.modified, result.stats.removed, result.stats.unchanged
    );
    println!("  summary: {}", result.summary);
    println!("  changelog: {}", result.changelog_path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Changelog / diff / status
// ---------------------------------------------------------------------------

/// Rebuild the changelog from every consecutive snapshot pair.
fn regenerate_changelog(config: &AppConfig) -> Result<()> {
    let snapshots = SnapshotStore::new(&config.defaults.snapshot_dir)?;
    let listed = snapshots.list()?;

    if listed.len() < 2 {
        println!("need at least 2 snapshots to generate a changelog");
        return Ok(());
    }

    // Newest-first listing: pair each snapshot with its predecessor.
    let mut reports = Vec::new();
    for pair in listed.windows(2) {
        let new = snapshots.load(&pair[0])?;
        let old = snapshots.load(&pair[1])?;
        reports.push(diff_snapshots(&old, &new, None));
    }

    let writer = ChangelogWriter::new(std::path::Path::new(&config.defaults.output_dir));
    writer.write(&reports)?;

    println!("✓ generated changelog from {} builds", reports.len());
    Ok(())
}

/// Diff two snapshot files and print the report.
fn print_diff(config: &AppConfig, old: &PathBuf, new: &PathBuf) -> Result<()> {
    let snapshots = SnapshotStore::new(&config.defaults.snapshot_dir)?;
    let old_snapshot = snapshots.load(old)?;
    let new_snapshot = snapshots.load(new)?;

    let report = diff_snapshots(&old_snapshot, &new_snapshot, None);

    println!(
        "{} → {}: {}",
        report.previous_snapshot_id, report.current_snapshot_id, report.summary
    );
    println!(
        "  {} added, {} modified, {} removed, {} unchanged",
        report.stats.added, report.stats.modified, report.stats.removed, report.stats.unchanged
    );

    for change in report.all_changes() {
        println!(
            "  [{}] {} {} — {}",
            serde_json::to_value(change.severity)?
                .as_str()
                .unwrap_or("?"),
            serde_json::to_value(change.change_type)?
                .as_str()
                .unwrap_or("?"),
            change.path,
            change.details
        );
    }
    Ok(())
}

/// Show knowledge-base and snapshot statistics.
fn print_status(config: &AppConfig) -> Result<()> {
    let kb_dir = PathBuf::from(&config.defaults.output_dir);
    if !kb_dir.exists() {
        println!("knowledge base not found; run `docsync build` first");
        return Ok(());
    }

    let page_count = count_markdown_files(&kb_dir)?;
    println!("pages: {page_count}");

    let manifest_path = kb_dir.join("manifest.json");
    if manifest_path.exists() {
        let manifest: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&manifest_path)?)?;
        if let Some(timestamp) = manifest.get("timestamp").and_then(|v| v.as_str()) {
            println!("last build: {timestamp}");
        }
        if let Some(commit) = manifest.get("repo_commit").and_then(|v| v.as_str()) {
            println!("repo commit: {commit}");
        }
    }

    let snapshots = SnapshotStore::new(&config.defaults.snapshot_dir)?;
    println!("snapshots: {}", snapshots.list()?.len());
    Ok(())
}

fn count_markdown_files(dir: &PathBuf) -> Result<usize> {
    let mut count = 0;
    for entry in std::fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if path.is_dir() {
            count += count_markdown_files(&path)?;
        } else if path.extension().is_some_and(|e| e == "md") {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name != "CHANGELOG.md" && !name.starts_with('_') {
                count += 1;
            }
        }
    }
    Ok(count)
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Spinner-backed progress for interactive terminals.
struct SpinnerProgress {
    bar: ProgressBar,
}

impl SpinnerProgress {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(100));
        Self { bar }
    }
}

impl ProgressReporter for SpinnerProgress {
    fn phase(&self, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn item(&self, detail: &str, current: usize, total: usize) {
        self.bar.set_message(format!("[{current}/{total}] {detail}"));
    }

    fn done(&self, _result: &BuildResult) {
        self.bar.finish_and_clear();
    }
}
