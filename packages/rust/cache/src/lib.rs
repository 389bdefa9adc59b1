//! On-disk blob cache for fetched resources.
//!
//! Each resource is stored at `<root>/<kind>/<key>` with an adjacent
//! `<key>.meta` JSON sidecar holding `{etag, last_modified, url}`.
//! Writes go to a temp file first and are renamed into place, payload
//! before sidecar; a sidecar without its payload is ignored on read, so an
//! interrupted build leaves the cache valid. Writers on the same key are
//! last-writer-wins.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use docsync_shared::{DocsyncError, Result};

/// Sidecar metadata stored next to each cached payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMeta {
    /// ETag returned by the upstream, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Last-Modified returned by the upstream, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    /// The URL the payload was fetched from.
    pub url: String,
    /// When the payload was written.
    #[serde(default)]
    pub fetched_at: Option<DateTime<Utc>>,
}

/// Keyed byte-blob store rooted at a cache directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    /// Open (and create) a cache rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| DocsyncError::io(&root, e))?;
        Ok(Self { root })
    }

    /// Read a cached payload and its metadata, if both are present.
    pub fn read(&self, kind: &str, key: &str) -> Option<(Vec<u8>, CacheMeta)> {
        let payload_path = self.payload_path(kind, key);
        let bytes = std::fs::read(&payload_path).ok()?;

        let meta = match std::fs::read_to_string(self.meta_path(kind, key)) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(meta) => meta,
                Err(e) => {
                    warn!(kind, key, error = %e, "unreadable cache sidecar, treating as miss");
                    return None;
                }
            },
            // Payload without sidecar is still usable.
            Err(_) => CacheMeta::default(),
        };

        debug!(kind, key, bytes = bytes.len(), "cache hit");
        Some((bytes, meta))
    }

    /// Write a payload and its metadata. Atomic per file: temp then rename,
    /// payload first so a torn write never leaves a sidecar without data.
    pub fn write(&self, kind: &str, key: &str, bytes: &[u8], meta: &CacheMeta) -> Result<()> {
        let payload_path = self.payload_path(kind, key);
        if let Some(parent) = payload_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DocsyncError::io(parent, e))?;
        }

        write_atomic(&payload_path, bytes)?;

        let meta = CacheMeta {
            fetched_at: Some(Utc::now()),
            ..meta.clone()
        };
        let meta_json = serde_json::to_vec(&meta)
            .map_err(|e| DocsyncError::Cache(format!("serialize sidecar: {e}")))?;
        write_atomic(&self.meta_path(kind, key), &meta_json)?;

        debug!(kind, key, bytes = bytes.len(), "cache write");
        Ok(())
    }

    /// Whether a payload exists for this key.
    pub fn contains(&self, kind: &str, key: &str) -> bool {
        self.payload_path(kind, key).exists()
    }

    fn payload_path(&self, kind: &str, key: &str) -> PathBuf {
        self.root.join(kind).join(sanitize_key(key))
    }

    fn meta_path(&self, kind: &str, key: &str) -> PathBuf {
        self.root.join(kind).join(format!("{}.meta", sanitize_key(key)))
    }
}

/// Write-to-temp then rename. Distinct keys never contend; same-key writers
/// race harmlessly because the rename is atomic.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| DocsyncError::Cache(format!("invalid cache path {}", path.display())))?;
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, bytes).map_err(|e| DocsyncError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| DocsyncError::io(path, e))?;
    Ok(())
}

/// Map an arbitrary key (usually a URL path) to a filesystem-safe name.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, CacheStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CacheStore::new(dir.path().join("cache")).expect("open cache");
        (dir, store)
    }

    fn meta(url: &str) -> CacheMeta {
        CacheMeta {
            etag: Some("\"abc\"".into()),
            last_modified: None,
            url: url.into(),
            fetched_at: None,
        }
    }

    #[test]
    fn write_then_read_roundtrip() {
        let (_dir, store) = store();
        store
            .write("repo", "overview/about.mdx", b"# About", &meta("https://x/about"))
            .unwrap();

        let (bytes, meta) = store.read("repo", "overview/about.mdx").expect("hit");
        assert_eq!(bytes, b"# About");
        assert_eq!(meta.url, "https://x/about");
        assert_eq!(meta.etag.as_deref(), Some("\"abc\""));
        assert!(meta.fetched_at.is_some());
    }

    #[test]
    fn miss_on_unknown_key() {
        let (_dir, store) = store();
        assert!(store.read("spec", "swagger.yaml").is_none());
        assert!(!store.contains("spec", "swagger.yaml"));
    }

    #[test]
    fn distinct_kinds_do_not_collide() {
        let (_dir, store) = store();
        store.write("repo", "k", b"repo", &meta("u1")).unwrap();
        store.write("web", "k", b"web", &meta("u2")).unwrap();

        assert_eq!(store.read("repo", "k").unwrap().0, b"repo");
        assert_eq!(store.read("web", "k").unwrap().0, b"web");
    }

    #[test]
    fn sidecar_without_payload_is_a_miss() {
        let (dir, store) = store();
        let kind_dir = dir.path().join("cache").join("manifests");
        std::fs::create_dir_all(&kind_dir).unwrap();
        std::fs::write(
            kind_dir.join("llms.txt.meta"),
            serde_json::to_vec(&meta("https://x/llms.txt")).unwrap(),
        )
        .unwrap();

        assert!(store.read("manifests", "llms.txt").is_none());
    }

    #[test]
    fn payload_without_sidecar_still_reads() {
        let (dir, store) = store();
        let kind_dir = dir.path().join("cache").join("repo");
        std::fs::create_dir_all(&kind_dir).unwrap();
        std::fs::write(kind_dir.join("page.mdx"), b"body").unwrap();

        let (bytes, meta) = store.read("repo", "page.mdx").expect("hit");
        assert_eq!(bytes, b"body");
        assert!(meta.url.is_empty());
    }

    #[test]
    fn rewrite_is_last_writer_wins() {
        let (_dir, store) = store();
        store.write("repo", "k", b"one", &meta("u")).unwrap();
        store.write("repo", "k", b"two", &meta("u")).unwrap();
        assert_eq!(store.read("repo", "k").unwrap().0, b"two");
    }

    #[test]
    fn no_temp_files_left_behind() {
        let (dir, store) = store();
        store.write("repo", "a/b/c.mdx", b"x", &meta("u")).unwrap();

        for entry in std::fs::read_dir(dir.path().join("cache").join("repo")).unwrap() {
            let name = entry.unwrap().file_name().to_string_lossy().to_string();
            assert!(!name.ends_with(".tmp"), "temp file left behind: {name}");
        }
    }

    #[test]
    fn keys_are_sanitized() {
        let (_dir, store) = store();
        store
            .write("web", "https://docs.example.com/models?x=1", b"h", &meta("u"))
            .unwrap();
        assert!(store.contains("web", "https://docs.example.com/models?x=1"));
    }
}
