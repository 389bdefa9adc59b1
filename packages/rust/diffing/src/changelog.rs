//! Changelog rendering: `CHANGELOG.md` for humans, `CHANGELOG.json` for
//! machines.
//!
//! The markdown file carries one `## <date>` block per diff report, newest
//! first, with fixed-order severity subsections. Appending prepends the
//! new report to the loaded report list and rewrites both files.

use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use docsync_shared::{DocsyncError, Result};

use crate::models::{ChangeEntry, ChangeType, DiffReport};

/// Informational subsections are truncated after this many entries.
const INFORMATIONAL_LIMIT: usize = 10;

/// Writes the paired changelog files inside a knowledge base directory.
#[derive(Debug, Clone)]
pub struct ChangelogWriter {
    markdown_path: PathBuf,
    json_path: PathBuf,
}

impl ChangelogWriter {
    pub fn new(kb_dir: &Path) -> Self {
        Self {
            markdown_path: kb_dir.join("CHANGELOG.md"),
            json_path: kb_dir.join("CHANGELOG.json"),
        }
    }

    /// Write both changelog files from a full list of reports
    /// (newest first).
    #[instrument(skip_all, fields(report_count = reports.len()))]
    pub fn write(&self, reports: &[DiffReport]) -> Result<()> {
        if let Some(parent) = self.markdown_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DocsyncError::io(parent, e))?;
        }

        let markdown = render_markdown(reports);
        std::fs::write(&self.markdown_path, markdown)
            .map_err(|e| DocsyncError::io(&self.markdown_path, e))?;

        let json = serde_json::to_string_pretty(reports)
            .map_err(|e| DocsyncError::Validation {
                message: format!("changelog serialization failed: {e}"),
            })?;
        std::fs::write(&self.json_path, json).map_err(|e| DocsyncError::io(&self.json_path, e))?;

        info!(path = %self.markdown_path.display(), "wrote changelog");
        Ok(())
    }

    /// Prepend a new report to the existing changelog and rewrite both
    /// files.
    pub fn append(&self, report: DiffReport) -> Result<()> {
        let mut reports = self.load_reports();
        reports.insert(0, report);
        self.write(&reports)
    }

    /// Load previously written reports; an unreadable file starts fresh.
    pub fn load_reports(&self) -> Vec<DiffReport> {
        match std::fs::read_to_string(&self.json_path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(reports) => reports,
                Err(e) => {
                    warn!(error = %e, "existing changelog JSON unreadable, starting fresh");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Markdown rendering
// ---------------------------------------------------------------------------

fn render_markdown(reports: &[DiffReport]) -> String {
    let mut out = String::from("# Documentation Changelog\n\n");
    out.push_str("Tracks changes to the API documentation knowledge base across builds.\n");

    for report in reports {
        out.push_str(&render_report(report));
    }

    out
}

fn render_report(report: &DiffReport) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "\n## {}\n\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S")
    ));

    if !report.summary.is_empty() {
        out.push_str(&format!("**Summary:** {}\n\n", report.summary));
    }

    out.push_str(&format!(
        "**Changes:** {} added, {} modified, {} removed, {} unchanged\n",
        report.stats.added, report.stats.removed, report.stats.modified, report.stats.unchanged
    ));

    render_section(&mut out, "🚨 Breaking", &report.breaking_changes, None);
    render_section(&mut out, "⚠️ Important", &report.important_changes, None);
    render_section(
        &mut out,
        "ℹ️ Informational",
        &report.informational_changes,
        Some(INFORMATIONAL_LIMIT),
    );
    render_section(&mut out, "🎨 Cosmetic", &report.cosmetic_changes, None);

    out
}

fn render_section(out: &mut String, heading: &str, changes: &[ChangeEntry], limit: Option<usize>) {
    if changes.is_empty() {
        return;
    }

    out.push_str(&format!("\n### {heading}\n\n"));

    let shown = limit.unwrap_or(changes.len()).min(changes.len());
    for change in &changes[..shown] {
        out.push_str(&render_change(change));
    }

    if changes.len() > shown {
        out.push_str(&format!("- …and {} more\n", changes.len() - shown));
    }
}

fn render_change(change: &ChangeEntry) -> String {
    let mut line = format!(
        "- **{}** `{}` — {}\n",
        change.change_type.badge(),
        change.path,
        change.details
    );

    if change.change_type == ChangeType::Modified {
        if let Some(ref preview) = change.diff_preview {
            line.push_str("  ```\n");
            for preview_line in preview.lines() {
                line.push_str(&format!("  {preview_line}\n"));
            }
            line.push_str("  ```\n");
        }
    }

    line
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
