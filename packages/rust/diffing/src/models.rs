//! Change-tracking models: change entries, severities, and diff reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Type of change detected between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Removed,
}

impl ChangeType {
    /// Badge used in changelog entry lines.
    pub fn badge(self) -> &'static str {
        match self {
            Self::Added => "🆕 NEW",
            Self::Modified => "📝 MODIFIED",
            Self::Removed => "🗑️ REMOVED",
        }
    }
}

/// Severity of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Endpoint removed, schema changed incompatibly.
    Breaking,
    /// New endpoint, new required param, pricing or auth change.
    Important,
    /// Prose update, model list refresh.
    Informational,
    /// Formatting, nav reorder, tiny edits.
    Cosmetic,
}

impl Severity {
    /// Higher rank = more severe.
    pub fn rank(self) -> u8 {
        match self {
            Self::Breaking => 3,
            Self::Important => 2,
            Self::Informational => 1,
            Self::Cosmetic => 0,
        }
    }

    /// The more severe of the two.
    pub fn max(self, other: Self) -> Self {
        if self.rank() >= other.rank() { self } else { other }
    }
}

/// A single change detected between snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub change_type: ChangeType,
    pub severity: Severity,
    /// Canonical page path, e.g. `api-reference/endpoint/chat/completions`.
    pub path: String,
    /// Human-readable breadcrumb, e.g. `Api Reference > Endpoint > Chat > Completions`.
    pub section: String,
    /// Page title.
    pub title: String,
    /// Full description of what changed.
    pub details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_tokens: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_tokens: Option<usize>,
    /// Up to 500 chars of unified diff (or a token/hash stand-in).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_preview: Option<String>,
}

/// Counters over one diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
    pub unchanged: usize,
}

/// Complete diff report between two snapshots, changes grouped by severity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffReport {
    pub generated_at: DateTime<Utc>,
    pub previous_snapshot_id: String,
    pub current_snapshot_id: String,
    /// One-line executive summary.
    pub summary: String,
    pub stats: DiffStats,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub breaking_changes: Vec<ChangeEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub important_changes: Vec<ChangeEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub informational_changes: Vec<ChangeEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cosmetic_changes: Vec<ChangeEntry>,
}

impl DiffReport {
    /// An empty report shell between two snapshot ids.
    pub fn empty(previous: &str, current: &str) -> Self {
        Self {
            generated_at: Utc::now(),
            previous_snapshot_id: previous.to_string(),
            current_snapshot_id: current.to_string(),
            summary: String::new(),
            stats: DiffStats::default(),
            breaking_changes: Vec::new(),
            important_changes: Vec::new(),
            informational_changes: Vec::new(),
            cosmetic_changes: Vec::new(),
        }
    }

    /// File a change entry under its severity group.
    pub fn push(&mut self, entry: ChangeEntry) {
        match entry.severity {
            Severity::Breaking => self.breaking_changes.push(entry),
            Severity::Important => self.important_changes.push(entry),
            Severity::Informational => self.informational_changes.push(entry),
            Severity::Cosmetic => self.cosmetic_changes.push(entry),
        }
    }

    /// All changes, most severe first.
    pub fn all_changes(&self) -> impl Iterator<Item = &ChangeEntry> {
        self.breaking_changes
            .iter()
            .chain(&self.important_changes)
            .chain(&self.informational_changes)
            .chain(&self.cosmetic_changes)
    }

    /// Count of changes with a given severity.
    pub fn severity_count(&self, severity: Severity) -> usize {
        match severity {
            Severity::Breaking => self.breaking_changes.len(),
            Severity::Important => self.important_changes.len(),
            Severity::Informational => self.informational_changes.len(),
            Severity::Cosmetic => self.cosmetic_changes.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(severity: Severity) -> ChangeEntry {
        ChangeEntry {
            change_type: ChangeType::Modified,
            severity,
            path: "models/text".into(),
            section: "Models > Text".into(),
            title: "Text Models".into(),
            details: "Modified: Text Models".into(),
            old_hash: None,
            new_hash: None,
            old_tokens: None,
            new_tokens: None,
            diff_preview: None,
        }
    }

    #[test]
    fn severity_ranks_ordered() {
        assert!(Severity::Breaking.rank() > Severity::Important.rank());
        assert!(Severity::Important.rank() > Severity::Informational.rank());
        assert!(Severity::Informational.rank() > Severity::Cosmetic.rank());
        assert_eq!(Severity::Cosmetic.max(Severity::Breaking), Severity::Breaking);
    }

    #[test]
    fn push_files_by_severity() {
        let mut report = DiffReport::empty("a", "b");
        report.push(entry(Severity::Breaking));
        report.push(entry(Severity::Cosmetic));
        report.push(entry(Severity::Important));

        assert_eq!(report.severity_count(Severity::Breaking), 1);
        assert_eq!(report.severity_count(Severity::Important), 1);
        assert_eq!(report.severity_count(Severity::Cosmetic), 1);

        let order: Vec<Severity> = report.all_changes().map(|c| c.severity).collect();
        assert_eq!(
            order,
            vec![Severity::Breaking, Severity::Important, Severity::Cosmetic]
        );
    }

    #[test]
    fn report_json_roundtrip() {
        let mut report = DiffReport::empty("20250101_000000", "20250102_000000");
        report.summary = "1 breaking".into();
        report.stats.modified = 1;
        report.push(entry(Severity::Breaking));

        let json = serde_json::to_string(&report).expect("serialize");
        let parsed: DiffReport = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, report);
    }

    #[test]
    fn severity_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Severity::Informational).unwrap(),
            "\"informational\""
        );
        assert_eq!(serde_json::to_string(&ChangeType::Added).unwrap(), "\"added\"");
    }
}
