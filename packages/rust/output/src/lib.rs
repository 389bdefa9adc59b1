//! Knowledge-base writer.
//!
//! Emits each surviving page as `<output>/<path>.md` with a structured
//! header, plus `index.json` (the page catalog) and `manifest.json` (build
//! metadata). A fixed directory skeleton is created up front so successive
//! snapshots compare consistently. Writes are serial and idempotent; every
//! file lands via write-to-temp then rename.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use docsync_shared::{
    COLLECTOR_VERSION, DocsyncError, RenderedPage, Result, SourceVersions, content_hash,
};

/// Directories pre-created in every knowledge base.
const SKELETON_DIRS: [&str; 5] = ["overview", "guides", "models", "api-reference/endpoint", "meta"];

/// Header keys in their fixed order, before any extras.
const HEADER_KEYS: [&str; 6] = [
    "title",
    "source",
    "last_updated",
    "content_hash",
    "token_count",
    "tags",
];

/// Writes the knowledge base directory.
#[derive(Debug, Clone)]
pub struct KbWriter {
    output_dir: PathBuf,
}

impl KbWriter {
    /// Open the output directory and create the skeleton.
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        for dir in SKELETON_DIRS {
            let path = output_dir.join(dir);
            std::fs::create_dir_all(&path).map_err(|e| DocsyncError::io(&path, e))?;
        }
        debug!(path = %output_dir.display(), "knowledge base skeleton ready");
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write every page, serially. `extras` are appended to each header
    /// after the fixed keys.
    #[instrument(skip_all, fields(page_count = pages.len()))]
    pub fn write_pages(
        &self,
        pages: &[RenderedPage],
        extras: &[(String, String)],
        last_updated: DateTime<Utc>,
    ) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(pages.len());

        for page in pages {
            let file_path = self.output_dir.join(format!("{}.md", page.path));
            if let Some(parent) = file_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| DocsyncError::io(parent, e))?;
            }

            let content = format!("{}\n{}", page_header(page, extras, last_updated), page.markdown);
            write_atomic(&file_path, content.as_bytes())?;
            written.push(file_path);
        }

        info!(pages = written.len(), "wrote knowledge base pages");
        Ok(written)
    }

    /// Emit `index.json`: pages grouped into top-level sections with
    /// per-page metadata and overall stats.
    #[instrument(skip_all)]
    pub fn write_index(&self, pages: &[RenderedPage], endpoints: &[Value]) -> Result<PathBuf> {
        let mut sections: BTreeMap<String, usize> = BTreeMap::new();
        for page in pages {
            let section = page
                .path
                .split_once('/')
                .map(|(first, _)| first)
                .unwrap_or("root");
            *sections.entry(section.to_string()).or_default() += 1;
        }

        let mut page_entries: Vec<&RenderedPage> = pages.iter().collect();
        page_entries.sort_by(|a, b| a.path.cmp(&b.path));

        let index = json!({
            "generated": Utc::now().to_rfc3339(),
            "sections": sections
                .iter()
                .map(|(name, count)| json!({ "name": name, "page_count": count }))
                .collect::<Vec<_>>(),
            "pages": page_entries
                .iter()
                .map(|p| json!({
                    "path": p.path,
                    "title": p.title,
                    "tags": p.tags,
                    "token_count": p.token_count,
                    "content_hash": p.content_hash,
                    "summary": p.description.clone().unwrap_or_default(),
                }))
                .collect::<Vec<_>>(),
            "endpoints": endpoints,
            "stats": {
                "total_pages": pages.len(),
                "total_endpoints": endpoints.len(),
                "total_tokens": pages.iter().map(|p| p.token_count).sum::<usize>(),
            },
        });

        let path = self.output_dir.join("index.json");
        write_json(&path, &index)?;
        Ok(path)
    }

    /// Emit `manifest.json`: build metadata.
    #[instrument(skip_all)]
    pub fn write_manifest(
        &self,
        source_versions: &SourceVersions,
        build_duration_seconds: f64,
        page_count: usize,
    ) -> Result<PathBuf> {
        let manifest = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "repo_commit": source_versions.repo_commit,
            "spec_hash": source_versions.spec_hash,
            "build_duration_seconds": build_duration_seconds,
            "page_count": page_count,
            "collector_version": COLLECTOR_VERSION,
        });

        let path = self.output_dir.join("manifest.json");
        write_json(&path, &manifest)?;
        Ok(path)
    }

    /// Check knowledge-base integrity: skeleton present, index parseable,
    /// and every page's stored hash matching its body. A hash mismatch is
    /// an internal invariant violation and fails validation.
    pub fn validate(&self) -> Result<()> {
        for dir in SKELETON_DIRS {
            if !self.output_dir.join(dir).exists() {
                return Err(DocsyncError::validation(format!("missing directory {dir}")));
            }
        }

        let index_path = self.output_dir.join("index.json");
        if index_path.exists() {
            let raw = std::fs::read_to_string(&index_path)
                .map_err(|e| DocsyncError::io(&index_path, e))?;
            serde_json::from_str::<Value>(&raw)
                .map_err(|e| DocsyncError::validation(format!("invalid index.json: {e}")))?;
        }

        validate_pages(&self.output_dir, &self.output_dir)
    }
}

fn validate_pages(root: &Path, dir: &Path) -> Result<()> {
    let read_dir = std::fs::read_dir(dir).map_err(|e| DocsyncError::io(dir, e))?;

    for entry in read_dir.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if path.is_dir() {
            validate_pages(root, &path)?;
            continue;
        }
        if !name.ends_with(".md") || name == "CHANGELOG.md" || name.starts_with('_') {
            continue;
        }

        let content = std::fs::read_to_string(&path).map_err(|e| DocsyncError::io(&path, e))?;
        let Some((stored_hash, body)) = header_hash_and_body(&content) else {
            continue;
        };

        let actual = content_hash(body);
        if stored_hash != actual {
            return Err(DocsyncError::validation(format!(
                "hash mismatch for {}: header {} vs content {}",
                path.strip_prefix(root).unwrap_or(&path).display(),
                &stored_hash[..12.min(stored_hash.len())],
                &actual[..12],
            )));
        }
    }

    Ok(())
}

/// Extract the `content_hash` header value and the body after the header.
fn header_hash_and_body(content: &str) -> Option<(String, &str)> {
    let rest = content.strip_prefix("---\n")?;
    let end = rest.find("\n---\n")?;

    let hash = rest[..end].lines().find_map(|line| {
        line.strip_prefix("content_hash:")
            .map(|v| v.trim().to_string())
    })?;

    // Header block is followed by one separating blank line.
    let body = rest[end + 5..].strip_prefix('\n').unwrap_or(&rest[end + 5..]);
    Some((hash, body))
}

/// Build the structured page header: fixed key order, then extras.
fn page_header(
    page: &RenderedPage,
    extras: &[(String, String)],
    last_updated: DateTime<Utc>,
) -> String {
    let mut out = String::from("---\n");
    for key in HEADER_KEYS {
        let value = match key {
            "title" => page.title.clone(),
            "source" => page.source.to_string(),
            "last_updated" => last_updated.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            "content_hash" => page.content_hash.clone(),
            "token_count" => page.token_count.to_string(),
            "tags" => page.tags.join(", "),
            _ => unreachable!(),
        };
        out.push_str(&format!("{key}: {value}\n"));
    }
    for (key, value) in extras {
        out.push_str(&format!("{key}: {value}\n"));
    }
    out.push_str("---\n");
    out
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    let pretty = serde_json::to_string_pretty(value)
        .map_err(|e| DocsyncError::validation(format!("JSON serialization failed: {e}")))?;
    write_atomic(path, pretty.as_bytes())?;
    debug!(path = %path.display(), "wrote JSON file");
    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| DocsyncError::validation(format!("invalid path {}", path.display())))?;
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, bytes).map_err(|e| DocsyncError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| DocsyncError::io(path, e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
