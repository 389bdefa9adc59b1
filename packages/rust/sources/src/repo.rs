//! Documentation-repository fetcher.
//!
//! Talks to the code host's REST API: one tree listing
//! (`git/trees/<branch>?recursive=1`), then per-file content fetches that
//! fan out with bounded parallelism. File contents arrive base64-encoded
//! and are decoded before caching.

use std::collections::HashMap;

use base64::Engine as _;
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use docsync_cache::{CacheMeta, CacheStore};
use docsync_shared::{AppConfig, DocsyncError, FetchConfig, Result};

use crate::retry::{self, Retry};

/// Cache kind for repository files.
const CACHE_KIND: &str = "repo";

/// Upper bound on concurrent in-flight file requests.
const MAX_FANOUT: usize = 16;

/// Result of listing the repository tree.
#[derive(Debug, Clone)]
pub struct RepoTree {
    /// Documentation file paths, repository-relative.
    pub paths: Vec<String>,
}

/// Client for the documentation repository.
pub struct RepoClient {
    client: reqwest::Client,
    cache: CacheStore,
    api_base: String,
    owner: String,
    repo: String,
    branch: String,
    docs_path: String,
    extensions: Vec<String>,
    token: Option<String>,
    force_refresh: bool,
}

impl RepoClient {
    pub fn new(
        client: reqwest::Client,
        cache: CacheStore,
        config: &AppConfig,
        fetch: &FetchConfig,
    ) -> Self {
        Self {
            client,
            cache,
            api_base: config.source.repo_api_base.trim_end_matches('/').to_string(),
            owner: config.source.repo_owner.clone(),
            repo: config.source.repo_name.clone(),
            branch: config.source.branch.clone(),
            docs_path: config.source.docs_path.clone(),
            extensions: config.source.extensions.clone(),
            token: config.repo_token(),
            force_refresh: fetch.force_refresh,
        }
    }

    /// List all documentation files under the configured subtree.
    #[instrument(skip_all, fields(owner = %self.owner, repo = %self.repo))]
    pub async fn list_tree(&self) -> Result<RepoTree> {
        let url = format!(
            "{}/repos/{}/{}/git/trees/{}?recursive=1",
            self.api_base, self.owner, self.repo, self.branch
        );

        let body = self.get_json(&url).await?;
        let entries = body
            .get("tree")
            .and_then(Value::as_array)
            .ok_or_else(|| DocsyncError::parse("tree response missing `tree` array"))?;

        let paths: Vec<String> = entries
            .iter()
            .filter(|e| e.get("type").and_then(Value::as_str) == Some("blob"))
            .filter_map(|e| e.get("path").and_then(Value::as_str))
            .filter(|p| self.is_doc_path(p))
            .map(String::from)
            .collect();

        info!(file_count = paths.len(), "listed documentation tree");
        Ok(RepoTree { paths })
    }

    /// Head commit SHA of the pinned branch, for snapshot provenance.
    pub async fn branch_commit(&self) -> Option<String> {
        let url = format!(
            "{}/repos/{}/{}/branches/{}",
            self.api_base, self.owner, self.repo, self.branch
        );

        match self.get_json(&url).await {
            Ok(body) => body
                .pointer("/commit/sha")
                .and_then(Value::as_str)
                .map(String::from),
            Err(e) => {
                warn!(error = %e, "could not resolve branch commit");
                None
            }
        }
    }

    /// Fetch one file's decoded content at the pinned branch.
    pub async fn fetch_file(&self, path: &str) -> Result<String> {
        if !self.force_refresh {
            if let Some((bytes, _meta)) = self.cache.read(CACHE_KIND, path) {
                return String::from_utf8(bytes)
                    .map_err(|e| DocsyncError::Cache(format!("{path}: invalid utf-8: {e}")));
            }
        }

        let url = format!(
            "{}/repos/{}/{}/contents/{}?ref={}",
            self.api_base, self.owner, self.repo, path, self.branch
        );

        let body = self.get_json(&url).await?;
        let content = decode_contents(&body)
            .ok_or_else(|| DocsyncError::parse(format!("{path}: unreadable contents payload")))?;

        self.cache.write(
            CACHE_KIND,
            path,
            content.as_bytes(),
            &CacheMeta {
                url,
                ..CacheMeta::default()
            },
        )?;

        Ok(content)
    }

    /// Fetch many files with bounded parallelism, re-keyed by path.
    /// Individual failures are logged and skipped.
    #[instrument(skip_all, fields(requested = paths.len()))]
    pub async fn fetch_all(&self, paths: &[String], concurrency: u32) -> HashMap<String, String> {
        let limit = (concurrency.max(1) as usize).min(MAX_FANOUT);

        let results: Vec<(String, Result<String>)> = futures::stream::iter(paths.iter().cloned())
            .map(|path| async move {
                let result = self.fetch_file(&path).await;
                (path, result)
            })
            .buffer_unordered(limit)
            .collect()
            .await;

        let mut files = HashMap::with_capacity(results.len());
        for (path, result) in results {
            match result {
                Ok(content) => {
                    files.insert(path, content);
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "failed to fetch repo file, skipping");
                }
            }
        }

        info!(fetched = files.len(), "repo file fan-out complete");
        files
    }

    fn is_doc_path(&self, path: &str) -> bool {
        let under_subtree = self.docs_path.is_empty() || path.starts_with(&self.docs_path);
        under_subtree && self.extensions.iter().any(|ext| path.ends_with(ext.as_str()))
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let text = retry::with_retry(url, || async {
            let mut request = self.client.get(url);
            if let Some(ref token) = self.token {
                request = request.bearer_auth(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| Retry::Transient(DocsyncError::Network(format!("{url}: {e}"))))?;

            if let Some(retry) = retry::classify_response(&response) {
                return Err(retry);
            }

            response.text().await.map_err(|e| {
                Retry::Transient(DocsyncError::Network(format!("{url}: body: {e}")))
            })
        })
        .await?;

        serde_json::from_str(&text).map_err(|e| DocsyncError::parse(format!("{url}: {e}")))
    }
}

/// Decode a contents-API payload: base64 when so marked, raw otherwise.
fn decode_contents(body: &Value) -> Option<String> {
    let content = body.get("content").and_then(Value::as_str)?;

    if body.get("encoding").and_then(Value::as_str) == Some("base64") {
        let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(compact)
            .ok()?;
        String::from_utf8(bytes).ok()
    } else {
        Some(content.to_string())
    }
}
