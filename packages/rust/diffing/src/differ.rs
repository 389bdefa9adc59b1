//! Snapshot diffing and severity classification.
//!
//! Set-diffs two page manifests, builds a human preview for each modified
//! page, and classifies every change by a first-match path rule table plus
//! textual breaking signals in the preview.

use std::collections::HashMap;

use similar::TextDiff;
use tracing::{info, instrument};

use docsync_shared::Snapshot;

use crate::models::{ChangeEntry, ChangeType, DiffReport, Severity};

/// Diff previews are truncated to this many characters.
const PREVIEW_LIMIT: usize = 500;

/// Ordered, first-match baseline severity rules by path substring.
const PATH_RULES: &[(&str, Severity)] = &[
    ("overview/deprecations", Severity::Breaking),
    ("api-reference/endpoint/", Severity::Important),
    ("api-reference/error-codes", Severity::Important),
    ("api-reference/rate-limiting", Severity::Important),
    ("overview/pricing", Severity::Important),
    ("models/", Severity::Informational),
    ("guides/", Severity::Informational),
    ("overview/beta-models", Severity::Informational),
    ("overview/privacy", Severity::Informational),
];

/// Lower-cased signals that upgrade a modification to breaking.
const BREAKING_SIGNALS: &[&str] = &[
    "removed",
    "deprecated",
    "no longer",
    "breaking",
    "required parameter",
    "schema change",
    "endpoint removed",
    "status code changed",
    "authentication changed",
];

/// Relative token-delta below which an informational modification is
/// downgraded to cosmetic.
const COSMETIC_DELTA: f64 = 0.05;

/// Loaded page bodies for real unified-diff previews. When absent the
/// differ falls back to a token/hash stand-in preview.
#[derive(Debug, Default, Clone)]
pub struct PageContents {
    pub old: HashMap<String, String>,
    pub new: HashMap<String, String>,
}

/// Diff two snapshots into a severity-classified report.
#[instrument(skip_all, fields(old = %old.snapshot_id, new = %new.snapshot_id))]
pub fn diff_snapshots(
    old: &Snapshot,
    new: &Snapshot,
    contents: Option<&PageContents>,
) -> DiffReport {
    let mut report = DiffReport::empty(&old.snapshot_id, &new.snapshot_id);

    // Added pages.
    for (path, meta) in &new.page_manifest {
        if old.page_manifest.contains_key(path) {
            continue;
        }
        report.stats.added += 1;
        report.push(ChangeEntry {
            change_type: ChangeType::Added,
            severity: Severity::Informational,
            path: path.clone(),
            section: section_from_path(path),
            title: meta.title.clone(),
            details: format!("New page: {}", meta.title),
            old_hash: None,
            new_hash: Some(meta.hash.clone()),
            old_tokens: None,
            new_tokens: Some(meta.token_count),
            diff_preview: None,
        });
    }

    // Removed pages.
    for (path, meta) in &old.page_manifest {
        if new.page_manifest.contains_key(path) {
            continue;
        }
        report.stats.removed += 1;
        report.push(ChangeEntry {
            change_type: ChangeType::Removed,
            severity: classify_removal(path),
            path: path.clone(),
            section: section_from_path(path),
            title: meta.title.clone(),
            details: format!("Removed page: {}", meta.title),
            old_hash: Some(meta.hash.clone()),
            new_hash: None,
            old_tokens: Some(meta.token_count),
            new_tokens: None,
            diff_preview: None,
        });
    }

    // Common pages: unchanged or modified.
    for (path, old_meta) in &old.page_manifest {
        let Some(new_meta) = new.page_manifest.get(path) else {
            continue;
        };

        if old_meta.hash == new_meta.hash {
            report.stats.unchanged += 1;
            continue;
        }

        let preview = build_preview(path, old_meta, new_meta, contents);
        let severity = classify_modification(
            path,
            &preview,
            old_meta.token_count,
            new_meta.token_count,
        );

        report.stats.modified += 1;
        report.push(ChangeEntry {
            change_type: ChangeType::Modified,
            severity,
            path: path.clone(),
            section: section_from_path(path),
            title: new_meta.title.clone(),
            details: format!("Modified: {}", new_meta.title),
            old_hash: Some(old_meta.hash.clone()),
            new_hash: Some(new_meta.hash.clone()),
            old_tokens: Some(old_meta.token_count),
            new_tokens: Some(new_meta.token_count),
            diff_preview: Some(preview),
        });
    }

    report.summary = summarize(&report);

    info!(
        added = report.stats.added,
        removed = report.stats.removed,
        modified = report.stats.modified,
        unchanged = report.stats.unchanged,
        "diff complete"
    );

    report
}

/// The single informational entry emitted for a first build.
pub fn initial_build_report(snapshot: &Snapshot) -> DiffReport {
    let mut report = DiffReport::empty("none", &snapshot.snapshot_id);
    let page_count = snapshot.page_manifest.len();

    report.stats.added = page_count;
    report.summary = "Initial build".to_string();
    report.push(ChangeEntry {
        change_type: ChangeType::Added,
        severity: Severity::Informational,
        path: "knowledge_base".into(),
        section: "Knowledge Base".into(),
        title: "Initial build".into(),
        details: format!("Initial build: {page_count} pages"),
        old_hash: None,
        new_hash: None,
        old_tokens: None,
        new_tokens: None,
        diff_preview: None,
    });
    report
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// First matching path rule, else the cosmetic baseline.
fn baseline_severity(path: &str) -> Severity {
    PATH_RULES
        .iter()
        .find(|(fragment, _)| path.contains(fragment))
        .map(|&(_, severity)| severity)
        .unwrap_or(Severity::Cosmetic)
}

/// A removal starts at important; removing an important-or-stronger page
/// (an endpoint, the deprecations list) escalates to breaking.
fn classify_removal(path: &str) -> Severity {
    match baseline_severity(path) {
        Severity::Breaking | Severity::Important => Severity::Breaking,
        _ => Severity::Important,
    }
}

fn classify_modification(
    path: &str,
    preview: &str,
    old_tokens: usize,
    new_tokens: usize,
) -> Severity {
    let mut severity = baseline_severity(path);

    let preview_lower = preview.to_lowercase();
    if BREAKING_SIGNALS
        .iter()
        .any(|signal| preview_lower.contains(signal))
    {
        return Severity::Breaking;
    }

    if severity == Severity::Informational {
        let delta = new_tokens.abs_diff(old_tokens) as f64 / old_tokens.max(1) as f64;
        if delta < COSMETIC_DELTA {
            severity = Severity::Cosmetic;
        }
    }

    severity
}

// ---------------------------------------------------------------------------
// Previews, sections, summary
// ---------------------------------------------------------------------------

/// Unified diff with three context lines when both bodies are loaded;
/// otherwise a token/hash stand-in. Truncated to 500 chars.
fn build_preview(
    path: &str,
    old_meta: &docsync_shared::PageMetadata,
    new_meta: &docsync_shared::PageMetadata,
    contents: Option<&PageContents>,
) -> String {
    let loaded = contents.and_then(|c| {
        let old_body = c.old.get(path)?;
        let new_body = c.new.get(path)?;
        Some((old_body, new_body))
    });

    let preview = match loaded {
        Some((old_body, new_body)) => {
            let diff = TextDiff::from_lines(old_body.as_str(), new_body.as_str());
            diff.unified_diff().context_radius(3).to_string()
        }
        None => format!(
            "tokens: {} → {}; hash: {}… → {}…",
            old_meta.token_count,
            new_meta.token_count,
            &old_meta.hash[..old_meta.hash.len().min(8)],
            &new_meta.hash[..new_meta.hash.len().min(8)],
        ),
    };

    truncate_chars(&preview, PREVIEW_LIMIT)
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit).collect();
    out.push('…');
    out
}

/// `api-reference/endpoint/chat` → `Api Reference > Endpoint > Chat`.
fn section_from_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            segment
                .split(['-', '_'])
                .filter(|w| !w.is_empty())
                .map(|word| {
                    let mut chars = word.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                        None => String::new(),
                    }
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join(" > ")
}

/// `"<n> breaking, <n> important, <n> added, <n> removed"`, omitting zero
/// terms; empty → `"No significant changes"`.
fn summarize(report: &DiffReport) -> String {
    let mut terms = Vec::new();

    let breaking = report.severity_count(Severity::Breaking);
    if breaking > 0 {
        terms.push(format!("{breaking} breaking"));
    }
    let important = report.severity_count(Severity::Important);
    if important > 0 {
        terms.push(format!("{important} important"));
    }
    if report.stats.added > 0 {
        terms.push(format!("{} added", report.stats.added));
    }
    if report.stats.removed > 0 {
        terms.push(format!("{} removed", report.stats.removed));
    }

    if terms.is_empty() {
        "No significant changes".to_string()
    } else {
        terms.join(", ")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use docsync_shared::{PageMetadata, SourceVersions};
    use std::collections::BTreeMap;

    fn meta(hash: &str, tokens: usize, title: &str) -> PageMetadata {
        PageMetadata {
            hash: hash.into(),
            token_count: tokens,
            title: title.into(),
            tags: vec![],
        }
    }

    fn snapshot(id: &str, pages: &[(&str, PageMetadata)]) -> Snapshot {
        let mut manifest = BTreeMap::new();
        for (path, m) in pages {
            manifest.insert(path.to_string(), m.clone());
        }
        Snapshot {
            snapshot_id: id.into(),
            generated_at: Utc::now(),
            source_versions: SourceVersions::default(),
            page_manifest: manifest,
        }
    }

    #[test]
    fn set_diff_invariants_hold() {
        let old = snapshot(
            "old",
            &[
                ("a", meta("h1", 10, "A")),
                ("b", meta("h2", 10, "B")),
                ("c", meta("h3", 10, "C")),
            ],
        );
        let new = snapshot(
            "new",
            &[
                ("a", meta("h1", 10, "A")),          // unchanged
                ("b", meta("h2-new", 12, "B")),      // modified
                ("d", meta("h4", 10, "D")),          // added
            ],
        );

        let report = diff_snapshots(&old, &new, None);

        assert_eq!(report.stats.added, 1);
        assert_eq!(report.stats.removed, 1);
        assert_eq!(report.stats.modified, 1);
        assert_eq!(report.stats.unchanged, 1);

        // added + removed + modified + unchanged = |old ∪ new|
        let union: std::collections::HashSet<&str> = old
            .page_manifest
            .keys()
            .chain(new.page_manifest.keys())
            .map(String::as_str)
            .collect();
        assert_eq!(
            report.stats.added + report.stats.removed + report.stats.modified
                + report.stats.unchanged,
            union.len()
        );

        for change in report.all_changes() {
            let in_old = old.page_manifest.contains_key(&change.path);
            let in_new = new.page_manifest.contains_key(&change.path);
            assert!(in_old || in_new);
            match change.change_type {
                ChangeType::Added => assert!(!in_old && in_new),
                ChangeType::Removed => assert!(in_old && !in_new),
                ChangeType::Modified => assert!(in_old && in_new),
            }
        }
    }

    #[test]
    fn unchanged_pages_are_not_emitted() {
        let old = snapshot("old", &[("a", meta("same", 10, "A"))]);
        let new = snapshot("new", &[("a", meta("same", 10, "A"))]);

        let report = diff_snapshots(&old, &new, None);
        assert_eq!(report.stats.unchanged, 1);
        assert_eq!(report.all_changes().count(), 0);
        assert_eq!(report.summary, "No significant changes");
    }

    #[test]
    fn breaking_signal_in_real_diff_upgrades_severity() {
        // S4: an endpoint page's new content mentions a required parameter.
        let path = "api-reference/endpoint/chat/completions";
        let old = snapshot("old", &[(path, meta("h-old", 100, "Chat Completions"))]);
        let new = snapshot("new", &[(path, meta("h-new", 110, "Chat Completions"))]);

        let mut contents = PageContents::default();
        contents
            .old
            .insert(path.into(), "Parameters are unchanged.\n".into());
        contents.new.insert(
            path.into(),
            "required parameter `model` added to this endpoint.\n".into(),
        );

        let report = diff_snapshots(&old, &new, Some(&contents));
        assert_eq!(report.breaking_changes.len(), 1);
        let change = &report.breaking_changes[0];
        assert_eq!(change.change_type, ChangeType::Modified);
        assert!(change.diff_preview.as_ref().unwrap().contains("required parameter"));
    }

    #[test]
    fn small_guide_edit_is_cosmetic() {
        // S5: guides page, token delta 2%.
        let path = "guides/getting-started";
        let old = snapshot("old", &[(path, meta("h-old", 100, "Getting Started"))]);
        let new = snapshot("new", &[(path, meta("h-new", 102, "Getting Started"))]);

        let report = diff_snapshots(&old, &new, None);
        assert_eq!(report.cosmetic_changes.len(), 1);
        assert_eq!(report.cosmetic_changes[0].severity, Severity::Cosmetic);
    }

    #[test]
    fn large_guide_edit_stays_informational() {
        let path = "guides/getting-started";
        let old = snapshot("old", &[(path, meta("h-old", 100, "Getting Started"))]);
        let new = snapshot("new", &[(path, meta("h-new", 150, "Getting Started"))]);

        let report = diff_snapshots(&old, &new, None);
        assert_eq!(report.informational_changes.len(), 1);
    }

    #[test]
    fn endpoint_removal_is_breaking() {
        // S6: endpoint present in old, absent in new.
        let path = "api-reference/endpoint/audio/speech";
        let old = snapshot("old", &[(path, meta("h", 50, "Audio Speech"))]);
        let new = snapshot("new", &[]);

        let report = diff_snapshots(&old, &new, None);
        assert_eq!(report.breaking_changes.len(), 1);
        assert_eq!(report.breaking_changes[0].change_type, ChangeType::Removed);
    }

    #[test]
    fn guide_removal_is_important() {
        let old = snapshot("old", &[("guides/legacy", meta("h", 50, "Legacy"))]);
        let new = snapshot("new", &[]);

        let report = diff_snapshots(&old, &new, None);
        assert_eq!(report.important_changes.len(), 1);
    }

    #[test]
    fn added_pages_are_informational() {
        let old = snapshot("old", &[]);
        let new = snapshot(
            "new",
            &[("api-reference/endpoint/video/queue", meta("h", 50, "Video Queue"))],
        );

        let report = diff_snapshots(&old, &new, None);
        assert_eq!(report.informational_changes.len(), 1);
        assert_eq!(
            report.informational_changes[0].change_type,
            ChangeType::Added
        );
    }

    #[test]
    fn standin_preview_never_triggers_signals() {
        // The stand-in preview contains "tokens:"/"hash:" only, so a
        // deprecations-path edit keeps its baseline severity.
        let path = "overview/pricing";
        let old = snapshot("old", &[(path, meta("aaaaaaaaaa", 100, "Pricing"))]);
        let new = snapshot("new", &[(path, meta("bbbbbbbbbb", 200, "Pricing"))]);

        let report = diff_snapshots(&old, &new, None);
        assert_eq!(report.important_changes.len(), 1);
        let preview = report.important_changes[0].diff_preview.as_ref().unwrap();
        assert!(preview.starts_with("tokens: 100 → 200"));
        assert!(preview.contains("aaaaaaaa… → bbbbbbbb…"));
    }

    #[test]
    fn deprecations_path_is_breaking_baseline() {
        let path = "overview/deprecations";
        let old = snapshot("old", &[(path, meta("h1", 100, "Deprecations"))]);
        let new = snapshot("new", &[(path, meta("h2", 300, "Deprecations"))]);

        let report = diff_snapshots(&old, &new, None);
        assert_eq!(report.breaking_changes.len(), 1);
    }

    #[test]
    fn preview_truncated_to_limit() {
        let long = "x\n".repeat(2000);
        let path = "guides/long";
        let old = snapshot("old", &[(path, meta("h1", 100, "Long"))]);
        let new = snapshot("new", &[(path, meta("h2", 300, "Long"))]);

        let mut contents = PageContents::default();
        contents.old.insert(path.into(), long.clone());
        contents.new.insert(path.into(), format!("{long}different ending\n"));

        let report = diff_snapshots(&old, &new, Some(&contents));
        let preview = report
            .all_changes()
            .next()
            .unwrap()
            .diff_preview
            .clone()
            .unwrap();
        assert!(preview.chars().count() <= PREVIEW_LIMIT + 1);
        assert!(preview.ends_with('…'));
    }

    #[test]
    fn section_titlecases_path() {
        assert_eq!(
            section_from_path("api-reference/endpoint/chat/completions"),
            "Api Reference > Endpoint > Chat > Completions"
        );
        assert_eq!(section_from_path("models/model_feature"), "Models > Model Feature");
    }

    #[test]
    fn summary_omits_zero_terms() {
        let old = snapshot("old", &[("api-reference/endpoint/a", meta("h", 10, "A"))]);
        let new = snapshot("new", &[]);
        let report = diff_snapshots(&old, &new, None);
        assert_eq!(report.summary, "1 breaking, 1 removed");
    }

    #[test]
    fn initial_build_has_single_informational_entry() {
        // S1.
        let snap = snapshot(
            "first",
            &[
                ("a", meta("h1", 1, "A")),
                ("b", meta("h2", 1, "B")),
                ("c", meta("h3", 1, "C")),
            ],
        );
        let report = initial_build_report(&snap);

        assert_eq!(report.all_changes().count(), 1);
        let entry = report.informational_changes.first().unwrap();
        assert_eq!(entry.title, "Initial build");
        assert_eq!(entry.severity, Severity::Informational);
        assert_eq!(report.stats.added, 3);
    }
}
