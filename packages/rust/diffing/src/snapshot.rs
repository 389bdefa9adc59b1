//! Snapshot persistence.
//!
//! One JSON file per build under the snapshot directory, named
//! `snapshot_<YYYYMMDD_HHMMSS>.json`. The store is append-only: snapshots
//! are written atomically (temp file, then rename) and never modified or
//! deleted afterwards.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use docsync_shared::{
    DocsyncError, PageMetadata, Result, Snapshot, SourceVersions, content_hash, count_tokens,
};

/// Append-only store of build snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Open (and create) the snapshot directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| DocsyncError::io(&dir, e))?;
        Ok(Self { dir })
    }

    /// Stamp a new snapshot from a page manifest.
    pub fn stamp(
        page_manifest: BTreeMap<String, PageMetadata>,
        source_versions: SourceVersions,
    ) -> Snapshot {
        let now = Utc::now();
        Snapshot {
            snapshot_id: now.format("%Y%m%d_%H%M%S").to_string(),
            generated_at: now,
            source_versions,
            page_manifest,
        }
    }

    /// Save a snapshot atomically. Returns the file path.
    #[instrument(skip_all, fields(snapshot_id = %snapshot.snapshot_id))]
    pub fn save(&self, snapshot: &Snapshot) -> Result<PathBuf> {
        let path = self.dir.join(format!("snapshot_{}.json", snapshot.snapshot_id));
        let temp = self.dir.join(format!(".snapshot_{}.json.tmp", snapshot.snapshot_id));

        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| DocsyncError::Snapshot(format!("serialize: {e}")))?;

        std::fs::write(&temp, json).map_err(|e| DocsyncError::io(&temp, e))?;
        std::fs::rename(&temp, &path).map_err(|e| DocsyncError::io(&path, e))?;

        info!(path = %path.display(), pages = snapshot.page_manifest.len(), "saved snapshot");
        Ok(path)
    }

    /// Load one snapshot file.
    pub fn load(&self, path: &Path) -> Result<Snapshot> {
        let content = std::fs::read_to_string(path).map_err(|e| DocsyncError::io(path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| DocsyncError::Snapshot(format!("{}: {e}", path.display())))
    }

    /// All snapshot files, newest first by modification time.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let mut entries: Vec<(std::time::SystemTime, PathBuf)> = Vec::new();

        let read_dir = std::fs::read_dir(&self.dir).map_err(|e| DocsyncError::io(&self.dir, e))?;
        for entry in read_dir.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with("snapshot_") || !name.ends_with(".json") {
                continue;
            }
            let mtime = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            entries.push((mtime, path));
        }

        entries.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
        Ok(entries.into_iter().map(|(_, path)| path).collect())
    }

    /// Load the most recent snapshot, or `None` when no snapshot exists.
    pub fn load_latest(&self) -> Result<Option<Snapshot>> {
        match self.list()?.first() {
            Some(path) => {
                debug!(path = %path.display(), "loading latest snapshot");
                self.load(path).map(Some)
            }
            None => {
                info!("no previous snapshots found");
                Ok(None)
            }
        }
    }

    /// Rebuild a page manifest by walking an existing knowledge base
    /// directory. Reads hash/tokens/title/tags back out of the page
    /// headers; pages without a header are fingerprinted from their body.
    #[instrument(skip_all, fields(kb_dir = %kb_dir.display()))]
    pub fn scan(&self, kb_dir: &Path) -> Result<BTreeMap<String, PageMetadata>> {
        let mut manifest = BTreeMap::new();
        scan_dir(kb_dir, kb_dir, &mut manifest)?;
        info!(pages = manifest.len(), "scanned knowledge base");
        Ok(manifest)
    }
}

fn scan_dir(
    root: &Path,
    dir: &Path,
    manifest: &mut BTreeMap<String, PageMetadata>,
) -> Result<()> {
    let read_dir = match std::fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(DocsyncError::io(dir, e)),
    };

    for entry in read_dir.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if path.is_dir() {
            scan_dir(root, &path, manifest)?;
            continue;
        }

        // Special files do not belong to the page manifest.
        if !name.ends_with(".md") || name.starts_with('_') || name == "CHANGELOG.md" {
            continue;
        }

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable page, skipping");
                continue;
            }
        };

        let rel = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .with_extension("")
            .to_string_lossy()
            .replace('\\', "/");

        manifest.insert(rel, page_metadata_from_file(&content));
    }

    Ok(())
}

/// Recover page metadata from a written page: prefer the header fields,
/// recompute anything missing from the body.
fn page_metadata_from_file(content: &str) -> PageMetadata {
    let (header, body) = split_header(content);

    let hash = header
        .get("content_hash")
        .cloned()
        .unwrap_or_else(|| content_hash(body));
    let token_count = header
        .get("token_count")
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| count_tokens(body));
    let title = header
        .get("title")
        .cloned()
        .or_else(|| extract_title(body))
        .unwrap_or_else(|| "Untitled".to_string());
    let tags = header
        .get("tags")
        .map(|raw| {
            raw.split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default();

    PageMetadata {
        hash,
        token_count,
        title,
        tags,
    }
}

/// Split the `---` header block into key/value pairs plus the body.
fn split_header(content: &str) -> (std::collections::HashMap<String, String>, &str) {
    let mut header = std::collections::HashMap::new();

    let Some(rest) = content.strip_prefix("---\n") else {
        return (header, content);
    };
    let Some(end) = rest.find("\n---\n") else {
        return (header, content);
    };

    for line in rest[..end].lines() {
        if let Some((key, value)) = line.split_once(':') {
            header.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    (header, &rest[end + 5..])
}

fn extract_title(body: &str) -> Option<String> {
    body.lines()
        .find_map(|line| line.strip_prefix("# ").map(|t| t.trim().to_string()))
}
