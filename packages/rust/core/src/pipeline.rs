//! End-to-end build pipeline: fetch → merge → dedup → write → snapshot →
//! diff → changelog.
//!
//! Source-layer failures degrade to empty inputs with warnings so the
//! merge stage always sees a total input; only writer and snapshot
//! failures abort the build. A failed build never touches the previous
//! snapshot — snapshots are written last, atomically.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use tracing::{info, instrument, warn};

use docsync_cache::CacheStore;
use docsync_diffing::differ::PageContents;
use docsync_diffing::{ChangelogWriter, DiffStats, SnapshotStore, diff_snapshots, initial_build_report};
use docsync_output::KbWriter;
use docsync_shared::{
    AppConfig, CanonicalPage, FetchConfig, Result, Snapshot, SourceVersions,
};
use docsync_sources::{DynamicFetcher, RepoClient, catalog_markdown, fetch_manifests, fetch_models,
    fetch_spec, http_client};

use crate::dedup::{ContentSynthesizer, deduplicate};
use crate::merger::{MergeInputs, merge};

// ---------------------------------------------------------------------------
// Options, result, progress
// ---------------------------------------------------------------------------

/// Everything a build needs, resolved at the CLI boundary.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub config: AppConfig,
    pub fetch: FetchConfig,
    pub output_dir: PathBuf,
    pub snapshot_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl BuildOptions {
    /// Resolve directories from the config's defaults.
    pub fn from_config(config: AppConfig) -> Self {
        let fetch = FetchConfig::from(&config);
        Self {
            output_dir: PathBuf::from(&config.defaults.output_dir),
            snapshot_dir: PathBuf::from(&config.defaults.snapshot_dir),
            cache_dir: PathBuf::from(&config.defaults.cache_dir),
            fetch,
            config,
        }
    }
}

/// Result of one completed build.
#[derive(Debug)]
pub struct BuildResult {
    pub page_count: usize,
    pub endpoint_count: usize,
    pub snapshot_path: PathBuf,
    pub changelog_path: PathBuf,
    pub stats: DiffStats,
    pub summary: String,
    pub elapsed: std::time::Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called per item within a phase.
    fn item(&self, detail: &str, current: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, result: &BuildResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item(&self, _detail: &str, _current: usize, _total: usize) {}
    fn done(&self, _result: &BuildResult) {}
}

// ---------------------------------------------------------------------------
// Build
// ---------------------------------------------------------------------------

/// Run the full build pipeline.
#[instrument(skip_all, fields(output = %options.output_dir.display()))]
pub async fn build(
    options: &BuildOptions,
    progress: &dyn ProgressReporter,
    synthesizer: Option<&dyn ContentSynthesizer>,
) -> Result<BuildResult> {
    let start = Instant::now();
    let config = &options.config;
    let fetch = &options.fetch;

    let cache = CacheStore::new(&options.cache_dir)?;
    let client = http_client(fetch.timeout_secs)?;

    // --- Phase 1: manifests → canonical page list ---
    progress.phase("Loading manifests");
    let manifests = fetch_manifests(&client, &cache, config, fetch.force_refresh).await;
    let mut canonical = docsync_sources::canonical_pages(&manifests, config);

    // --- Phase 2: OpenAPI spec ---
    progress.phase("Parsing OpenAPI specification");
    let (endpoints, spec_hash) =
        match fetch_spec(&client, &cache, &config.source.spec_url, fetch.force_refresh).await {
            Ok(spec) => {
                let endpoints = docsync_openapi::parse_endpoints(&spec.document);
                (endpoints, Some(spec.spec_hash))
            }
            Err(e) => {
                warn!(error = %e, "spec unavailable, continuing without endpoints");
                (Vec::new(), None)
            }
        };
    info!(endpoint_count = endpoints.len(), "spec phase complete");

    // --- Phase 3: docs repository ---
    progress.phase("Fetching documentation repository");
    let repo = RepoClient::new(client.clone(), cache.clone(), config, fetch);
    let (repo_pages, repo_commit) = match repo.list_tree().await {
        Ok(tree) => {
            let commit = repo.branch_commit().await;
            let files = repo.fetch_all(&tree.paths, fetch.concurrency).await;
            (rekey_repo_files(files, &config.source.docs_path), commit)
        }
        Err(e) => {
            warn!(error = %e, "repo tree unavailable, continuing without repo pages");
            (HashMap::new(), None)
        }
    };

    // Pages the repo has but no manifest mentions still belong to the
    // knowledge base.
    supplement_canonical(&mut canonical, &repo_pages, config);

    // --- Phase 4: rendered site ---
    progress.phase("Fetching dynamic pages");
    let dynamic = DynamicFetcher::new(
        cache.clone(),
        &config.dynamic.wait_selectors,
        config.dynamic.wait_secs,
        fetch.force_refresh,
        fetch.skip_dynamic,
    );
    let dynamic_urls: Vec<String> = config
        .dynamic
        .pages
        .iter()
        .map(|path| config.page_url(path))
        .collect();
    let rendered = dynamic.fetch_all(&dynamic_urls).await;
    let scrape_timestamp = (!fetch.skip_dynamic && !rendered.is_empty()).then(Utc::now);

    // --- Phase 5: live model catalog ---
    progress.phase("Probing live API");
    let api_key = config.api_key();
    let models = fetch_models(&client, &config.source.api_base_url, api_key.as_deref()).await;
    let catalog = catalog_markdown(&models);

    // --- Phase 6: merge ---
    progress.phase("Merging sources");
    let merged = merge(&MergeInputs {
        canonical: &canonical,
        repo_pages: &repo_pages,
        endpoints: &endpoints,
        rendered: &rendered,
        live_catalog: catalog.as_deref(),
    });

    // --- Phase 7: dedup ---
    progress.phase("Deduplicating");
    let pages = deduplicate(
        merged,
        config.defaults.similarity_threshold,
        synthesizer,
    );

    // --- Phase 8: capture previous content for diff previews ---
    let snapshots = SnapshotStore::new(&options.snapshot_dir)?;
    let previous = match snapshots.load_latest() {
        Ok(previous) => previous,
        Err(e) => {
            warn!(error = %e, "latest snapshot unreadable, treating build as initial");
            None
        }
    };
    let previous_bodies = previous
        .as_ref()
        .map(|snapshot| read_page_bodies(&options.output_dir, snapshot))
        .unwrap_or_default();

    // --- Phase 9: write knowledge base ---
    progress.phase("Writing knowledge base");
    let writer = KbWriter::new(&options.output_dir)?;
    let mut extras = Vec::new();
    if let Some(ref commit) = repo_commit {
        extras.push(("repo_commit".to_string(), commit.clone()));
    }
    writer.write_pages(&pages, &extras, Utc::now())?;

    let endpoint_values: Vec<serde_json::Value> = endpoints
        .iter()
        .map(|e| serde_json::to_value(e).unwrap_or_default())
        .collect();
    writer.write_index(&pages, &endpoint_values)?;

    let source_versions = SourceVersions {
        repo_commit,
        spec_hash,
        scrape_timestamp,
    };
    writer.write_manifest(
        &source_versions,
        start.elapsed().as_secs_f64(),
        pages.len(),
    )?;

    // --- Phase 10: snapshot (written last, atomically) ---
    progress.phase("Creating snapshot");
    let page_manifest: BTreeMap<String, _> = pages
        .iter()
        .map(|p| (p.path.clone(), p.metadata()))
        .collect();
    let snapshot = SnapshotStore::stamp(page_manifest, source_versions);
    let snapshot_path = snapshots.save(&snapshot)?;

    // --- Phase 11: diff + changelog ---
    progress.phase("Generating changelog");
    let report = match previous {
        Some(ref old) => {
            let contents = PageContents {
                old: previous_bodies,
                new: pages
                    .iter()
                    .map(|p| (p.path.clone(), p.markdown.clone()))
                    .collect(),
            };
            diff_snapshots(old, &snapshot, Some(&contents))
        }
        None => {
            info!("no previous snapshot, recording initial build");
            initial_build_report(&snapshot)
        }
    };

    let stats = report.stats;
    let summary = report.summary.clone();
    let changelog = ChangelogWriter::new(&options.output_dir);
    changelog.append(report)?;

    let result = BuildResult {
        page_count: pages.len(),
        endpoint_count: endpoints.len(),
        snapshot_path,
        changelog_path: options.output_dir.join("CHANGELOG.md"),
        stats,
        summary,
        elapsed: start.elapsed(),
    };

    progress.done(&result);
    info!(
        page_count = result.page_count,
        endpoint_count = result.endpoint_count,
        elapsed_ms = result.elapsed.as_millis(),
        summary = %result.summary,
        "build complete"
    );

    Ok(result)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Re-key fetched repo files from repository paths to canonical page paths.
fn rekey_repo_files(
    files: HashMap<String, String>,
    docs_path: &str,
) -> HashMap<String, String> {
    files
        .into_iter()
        .map(|(path, content)| {
            let rel = path
                .strip_prefix(docs_path)
                .unwrap_or(&path)
                .trim_start_matches('/');
            let canonical = rel
                .trim_end_matches(".mdx")
                .trim_end_matches(".md")
                .to_string();
            (canonical, content)
        })
        .collect()
}

/// Append canonical entries for repo pages no manifest mentioned.
fn supplement_canonical(
    canonical: &mut Vec<CanonicalPage>,
    repo_pages: &HashMap<String, String>,
    config: &AppConfig,
) {
    let known: std::collections::HashSet<&str> =
        canonical.iter().map(|p| p.path.as_str()).collect();

    let mut extra: Vec<&String> = repo_pages
        .keys()
        .filter(|path| !known.contains(path.as_str()))
        .collect();
    extra.sort();

    for path in extra {
        canonical.push(CanonicalPage {
            path: path.clone(),
            title: humanize(path),
            external_url: config.page_url(path),
            description: None,
            breadcrumb: Vec::new(),
        });
    }
}

fn humanize(path: &str) -> String {
    let base = path.rsplit('/').next().unwrap_or(path);
    base.split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Read the previous build's page bodies (headers stripped) for real
/// unified-diff previews. Best-effort: unreadable pages are skipped.
fn read_page_bodies(output_dir: &Path, snapshot: &Snapshot) -> HashMap<String, String> {
    let mut bodies = HashMap::new();

    for path in snapshot.page_manifest.keys() {
        let file = output_dir.join(format!("{path}.md"));
        let Ok(content) = std::fs::read_to_string(&file) else {
            continue;
        };
        bodies.insert(path.clone(), strip_header(&content).to_string());
    }

    bodies
}

fn strip_header(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("---\n") else {
        return content;
    };
    let Some(end) = rest.find("\n---\n") else {
        return content;
    };
    rest[end + 5..].strip_prefix('\n').unwrap_or(&rest[end + 5..])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn b64(content: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(content)
    }

    /// Mount a full fake upstream: manifests, spec, repo tree + files.
    async fn mount_upstream(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/docs.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "navigation": [
                    { "group": "Overview", "pages": ["overview/about", "overview/getting-started"] },
                    { "group": "Guides", "pages": ["guides/quickstart"] }
                ]
            })))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/llms.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "# Docs\n\n- [About](https://docs.example.com/overview/about): Product overview\n",
            ))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/swagger.yaml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "openapi: 3.0.0\npaths:\n  /chat/completions:\n    post:\n      summary: Create a chat completion\n      responses:\n        \"200\":\n          description: OK\n",
            ))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/repos/acme/docs/git/trees/main"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tree": [
                    { "path": "overview/about.mdx", "type": "blob" },
                    { "path": "overview/getting-started.mdx", "type": "blob" },
                    { "path": "guides/quickstart.mdx", "type": "blob" }
                ]
            })))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/repos/acme/docs/branches/main"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "commit": { "sha": "commit-sha-1" }
            })))
            .mount(server)
            .await;

        for (file, title, body) in [
            ("overview/about.mdx", "About", "The product."),
            ("overview/getting-started.mdx", "Getting Started", "Start here."),
            ("guides/quickstart.mdx", "Quickstart", "Build fast."),
        ] {
            Mock::given(method("GET"))
                .and(path(format!("/repos/acme/docs/contents/{file}")))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "content": b64(&format!("---\ntitle: {title}\n---\n\n{body}\n")),
                    "encoding": "base64"
                })))
                .mount(server)
                .await;
        }
    }

    fn options(server: &MockServer, root: &Path) -> BuildOptions {
        let mut config = AppConfig::default();
        config.source.repo_api_base = server.uri();
        config.source.repo_owner = "acme".into();
        config.source.repo_name = "docs".into();
        config.source.docs_path = String::new();
        config.source.spec_url = format!("{}/swagger.yaml", server.uri());
        config.source.nav_manifest_url = format!("{}/docs.json", server.uri());
        config.source.url_list_url = format!("{}/llms.txt", server.uri());
        config.source.docs_base_url = "https://docs.example.com".into();
        config.source.api_base_url = format!("{}/api", server.uri());
        config.source.api_key_env = "DOCSYNC_TEST_NO_SUCH_KEY".into();

        let mut fetch = FetchConfig::from(&config);
        fetch.skip_dynamic = true;

        BuildOptions {
            fetch,
            output_dir: root.join("kb"),
            snapshot_dir: root.join("snapshots"),
            cache_dir: root.join("cache"),
            config,
        }
    }

    #[tokio::test]
    async fn initial_build_produces_pages_snapshot_and_changelog() {
        // S1: three repo pages, no prior snapshot.
        let server = MockServer::start().await;
        mount_upstream(&server).await;
        let dir = tempfile::tempdir().unwrap();

        let opts = options(&server, dir.path());
        let result = build(&opts, &SilentProgress, None).await.unwrap();

        assert!(result.page_count >= 3);
        assert_eq!(result.endpoint_count, 1);
        assert!(result.snapshot_path.exists());
        assert!(opts.output_dir.join("overview/about.md").exists());
        assert!(opts.output_dir.join("index.json").exists());
        assert!(opts.output_dir.join("manifest.json").exists());

        let changelog = std::fs::read_to_string(opts.output_dir.join("CHANGELOG.md")).unwrap();
        assert!(changelog.contains("Initial build"));

        // Header carries the repo commit extra.
        let page = std::fs::read_to_string(opts.output_dir.join("overview/about.md")).unwrap();
        assert!(page.contains("repo_commit: commit-sha-1"));
    }

    #[tokio::test]
    async fn rebuild_on_unchanged_inputs_is_deterministic() {
        let server = MockServer::start().await;
        mount_upstream(&server).await;
        let dir = tempfile::tempdir().unwrap();

        let opts = options(&server, dir.path());
        build(&opts, &SilentProgress, None).await.unwrap();
        // Snapshot ids have one-second resolution.
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        build(&opts, &SilentProgress, None).await.unwrap();

        let snapshots = SnapshotStore::new(&opts.snapshot_dir).unwrap();
        let listed = snapshots.list().unwrap();
        assert_eq!(listed.len(), 2);

        let newest = snapshots.load(&listed[0]).unwrap();
        let oldest = snapshots.load(&listed[1]).unwrap();
        assert_eq!(newest.page_manifest, oldest.page_manifest);

        // Second report records no changes.
        let changelog = ChangelogWriter::new(&opts.output_dir);
        let reports = changelog.load_reports();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].summary, "No significant changes");
        assert_eq!(reports[0].stats.unchanged, newest.page_manifest.len());
    }

    #[tokio::test]
    async fn degraded_sources_still_build() {
        // Everything 404s: the build still succeeds with zero canonical
        // pages and zero endpoints.
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        let opts = options(&server, dir.path());
        let result = build(&opts, &SilentProgress, None).await.unwrap();

        assert_eq!(result.page_count, 0);
        assert_eq!(result.endpoint_count, 0);
        assert!(result.snapshot_path.exists());
    }

    #[test]
    fn rekey_strips_subtree_and_extension() {
        let mut files = HashMap::new();
        files.insert("docs/overview/about.mdx".to_string(), "x".to_string());
        files.insert("docs/guides/a.md".to_string(), "y".to_string());

        let rekeyed = rekey_repo_files(files, "docs");
        assert!(rekeyed.contains_key("overview/about"));
        assert!(rekeyed.contains_key("guides/a"));
    }

    #[test]
    fn strip_header_returns_body() {
        let content = "---\ntitle: X\ncontent_hash: h\n---\n\n# X\n\nBody.\n";
        assert_eq!(strip_header(content), "# X\n\nBody.\n");
        assert_eq!(strip_header("no header"), "no header");
    }
}
