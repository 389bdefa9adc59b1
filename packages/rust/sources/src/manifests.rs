//! Manifest fetching and the canonical page list.
//!
//! Two manifests describe the documentation surface: a navigation manifest
//! (JSON, arbitrarily nested tabs/groups containing page references) and a
//! URL-list manifest (text, one linked entry per line). Their union is the
//! canonical page list every downstream stage is keyed by.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::Url;

use docsync_cache::{CacheMeta, CacheStore};
use docsync_shared::{AppConfig, CanonicalPage, Result};

use crate::retry;

/// Cache kind for manifest files.
const CACHE_KIND: &str = "manifests";

/// Raw manifest content; either side may be absent after a failed fetch.
#[derive(Debug, Clone, Default)]
pub struct Manifests {
    /// Parsed navigation manifest.
    pub navigation: Option<Value>,
    /// URL-list manifest text.
    pub url_list: Option<String>,
}

/// Fetch both manifests, degrading each side to `None` on failure.
#[instrument(skip_all)]
pub async fn fetch_manifests(
    client: &reqwest::Client,
    cache: &CacheStore,
    config: &AppConfig,
    force_refresh: bool,
) -> Manifests {
    let navigation = match fetch_text(
        client,
        cache,
        &config.source.nav_manifest_url,
        "nav.json",
        force_refresh,
    )
    .await
    {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, "navigation manifest is not valid JSON, ignoring");
                None
            }
        },
        Err(e) => {
            warn!(error = %e, "failed to fetch navigation manifest");
            None
        }
    };

    let url_list = match fetch_text(
        client,
        cache,
        &config.source.url_list_url,
        "url-list.txt",
        force_refresh,
    )
    .await
    {
        Ok(raw) => Some(raw),
        Err(e) => {
            warn!(error = %e, "failed to fetch URL-list manifest");
            None
        }
    };

    Manifests {
        navigation,
        url_list,
    }
}

async fn fetch_text(
    client: &reqwest::Client,
    cache: &CacheStore,
    url: &str,
    key: &str,
    force_refresh: bool,
) -> Result<String> {
    if !force_refresh {
        if let Some((bytes, _)) = cache.read(CACHE_KIND, key) {
            if let Ok(text) = String::from_utf8(bytes) {
                return Ok(text);
            }
        }
    }

    let body = retry::get_text(client, url).await?;
    cache.write(
        CACHE_KIND,
        key,
        body.as_bytes(),
        &CacheMeta {
            url: url.to_string(),
            ..CacheMeta::default()
        },
    )?;
    Ok(body)
}

// ---------------------------------------------------------------------------
// Canonical page list (union of both manifests)
// ---------------------------------------------------------------------------

/// Build the canonical page list.
///
/// Navigation order first (pre-order traversal, breadcrumbs accumulated),
/// then URL-list-only entries in list order with an empty breadcrumb. When
/// both manifests define the same path the richer record wins field-wise.
#[instrument(skip_all)]
pub fn canonical_pages(manifests: &Manifests, config: &AppConfig) -> Vec<CanonicalPage> {
    let mut pages: Vec<CanonicalPage> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    if let Some(ref nav) = manifests.navigation {
        let root = nav.get("navigation").unwrap_or(nav);
        let mut breadcrumb = Vec::new();
        walk_navigation(root, &mut breadcrumb, &mut pages, &mut index, config);
        debug!(nav_pages = pages.len(), "navigation manifest walked");
    }

    if let Some(ref url_list) = manifests.url_list {
        for entry in parse_url_list(url_list, &config.source.docs_base_url) {
            match index.get(&entry.path) {
                Some(&i) => {
                    // Fill gaps in the navigation record.
                    if pages[i].title.is_empty() {
                        if let Some(ref title) = entry.title {
                            pages[i].title = title.clone();
                        }
                    }
                    if pages[i].description.is_none() {
                        pages[i].description = entry.notes.clone();
                    }
                }
                None => {
                    index.insert(entry.path.clone(), pages.len());
                    pages.push(CanonicalPage {
                        external_url: config.page_url(&entry.path),
                        title: entry
                            .title
                            .clone()
                            .unwrap_or_else(|| humanize_segment(basename(&entry.path))),
                        description: entry.notes.clone(),
                        breadcrumb: Vec::new(),
                        path: entry.path,
                    });
                }
            }
        }
    }

    info!(page_count = pages.len(), "canonical page list built");
    pages
}

/// Keys whose values contain further navigation nodes.
const CONTAINER_KEYS: [&str; 6] = ["navigation", "tabs", "groups", "anchors", "pages", "items"];

/// Keys naming the section a container represents.
const LABEL_KEYS: [&str; 4] = ["tab", "group", "anchor", "title"];

fn walk_navigation(
    node: &Value,
    breadcrumb: &mut Vec<String>,
    pages: &mut Vec<CanonicalPage>,
    index: &mut HashMap<String, usize>,
    config: &AppConfig,
) {
    match node {
        Value::String(reference) => {
            push_page(reference, None, breadcrumb, pages, index, config);
        }
        Value::Array(items) => {
            for item in items {
                walk_navigation(item, breadcrumb, pages, index, config);
            }
        }
        Value::Object(map) => {
            // A leaf object carrying an explicit page reference.
            if let Some(reference) = map.get("page").and_then(Value::as_str) {
                let title = map.get("title").and_then(Value::as_str);
                push_page(reference, title, breadcrumb, pages, index, config);
                return;
            }

            let has_children = CONTAINER_KEYS.iter().any(|k| map.contains_key(*k));
            let label = LABEL_KEYS
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str));

            let pushed = match (has_children, label) {
                (true, Some(label)) => {
                    breadcrumb.push(label.to_string());
                    true
                }
                _ => false,
            };

            for key in CONTAINER_KEYS {
                if let Some(children) = map.get(key) {
                    walk_navigation(children, breadcrumb, pages, index, config);
                }
            }

            if pushed {
                breadcrumb.pop();
            }
        }
        _ => {}
    }
}

fn push_page(
    reference: &str,
    title: Option<&str>,
    breadcrumb: &[String],
    pages: &mut Vec<CanonicalPage>,
    index: &mut HashMap<String, usize>,
    config: &AppConfig,
) {
    // External links do not become pages.
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return;
    }

    let path = normalize_path(reference);
    if path.is_empty() {
        return;
    }

    let candidate = CanonicalPage {
        external_url: config.page_url(&path),
        title: title
            .map(String::from)
            .unwrap_or_else(|| humanize_segment(basename(&path))),
        description: None,
        breadcrumb: breadcrumb.to_vec(),
        path: path.clone(),
    };

    match index.get(&path) {
        Some(&i) => {
            if candidate.richness() > pages[i].richness() {
                pages[i] = candidate;
            }
        }
        None => {
            index.insert(path, pages.len());
            pages.push(candidate);
        }
    }
}

// ---------------------------------------------------------------------------
// URL-list parsing
// ---------------------------------------------------------------------------

/// One entry parsed from the URL-list manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
struct UrlListEntry {
    path: String,
    title: Option<String>,
    notes: Option<String>,
}

/// Matches `- [Name](url)` or `- [Name](url): Notes`.
static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-*]\s+\[([^\]]+)\]\(([^)]+)\)(?::\s*(.+))?$").expect("valid regex")
});

fn parse_url_list(content: &str, docs_base_url: &str) -> Vec<UrlListEntry> {
    let mut entries = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('>') {
            continue;
        }

        if let Some(caps) = LINK_RE.captures(trimmed) {
            if let Some(path) = reference_to_path(&caps[2], docs_base_url) {
                entries.push(UrlListEntry {
                    path,
                    title: Some(caps[1].trim().to_string()),
                    notes: caps.get(3).map(|m| m.as_str().trim().to_string()),
                });
            }
            continue;
        }

        // Bare URL or bare path lines.
        if !trimmed.contains(char::is_whitespace) {
            if let Some(path) = reference_to_path(trimmed, docs_base_url) {
                entries.push(UrlListEntry {
                    path,
                    title: None,
                    notes: None,
                });
            }
        }
    }

    entries
}

/// Map a URL or path reference to a canonical page path.
fn reference_to_path(reference: &str, docs_base_url: &str) -> Option<String> {
    let raw = if reference.starts_with("http://") || reference.starts_with("https://") {
        if let Some(rest) = reference.strip_prefix(docs_base_url) {
            rest.to_string()
        } else {
            Url::parse(reference).ok()?.path().to_string()
        }
    } else {
        reference.to_string()
    };

    let path = normalize_path(&raw);
    (!path.is_empty()).then_some(path)
}

/// Canonical form: no leading/trailing slashes, no page-file extension.
fn normalize_path(reference: &str) -> String {
    reference
        .trim()
        .trim_start_matches('/')
        .trim_end_matches('/')
        .trim_end_matches(".mdx")
        .trim_end_matches(".md")
        .to_string()
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// `getting-started` → `Getting Started`.
fn humanize_segment(segment: &str) -> String {
    segment
        .split(['-', '_'])
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

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> AppConfig {
        AppConfig::default()
    }

    fn nav_manifests(nav: Value) -> Manifests {
        Manifests {
            navigation: Some(nav),
            url_list: None,
        }
    }

    #[test]
    fn walks_nested_tabs_and_groups_preorder() {
        let nav = json!({
            "navigation": {
                "tabs": [
                    {
                        "tab": "Documentation",
                        "groups": [
                            { "group": "Overview", "pages": ["overview/about", "overview/getting-started"] },
                            { "group": "Models", "pages": ["models/overview"] }
                        ]
                    },
                    {
                        "tab": "API Reference",
                        "pages": ["api-reference/endpoint/chat/completions"]
                    }
                ]
            }
        });

        let pages = canonical_pages(&nav_manifests(nav), &config());
        let paths: Vec<_> = pages.iter().map(|p| p.path.as_str()).collect();

        assert_eq!(
            paths,
            vec![
                "overview/about",
                "overview/getting-started",
                "models/overview",
                "api-reference/endpoint/chat/completions",
            ]
        );
        assert_eq!(pages[0].breadcrumb, vec!["Documentation", "Overview"]);
        assert_eq!(pages[3].breadcrumb, vec!["API Reference"]);
        assert_eq!(pages[1].title, "Getting Started");
    }

    #[test]
    fn nested_group_objects_in_pages() {
        let nav = json!({
            "navigation": [
                {
                    "group": "Guides",
                    "pages": [
                        "guides/intro",
                        { "group": "Advanced", "pages": ["guides/advanced/caching"] }
                    ]
                }
            ]
        });

        let pages = canonical_pages(&nav_manifests(nav), &config());
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].path, "guides/advanced/caching");
        assert_eq!(pages[1].breadcrumb, vec!["Guides", "Advanced"]);
    }

    #[test]
    fn url_list_only_entries_appended_with_empty_breadcrumb() {
        let nav = json!({ "navigation": [ { "group": "Overview", "pages": ["overview/about"] } ] });
        let manifests = Manifests {
            navigation: Some(nav),
            url_list: Some(
                "# Product Docs\n\n> API documentation.\n\n- [About](https://docs.venice.ai/overview/about): The product\n- [Pricing](https://docs.venice.ai/overview/pricing): Cost per model\n".into(),
            ),
        };

        let pages = canonical_pages(&manifests, &config());
        let paths: Vec<_> = pages.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec!["overview/about", "overview/pricing"]);

        let pricing = &pages[1];
        assert!(pricing.breadcrumb.is_empty());
        assert_eq!(pricing.title, "Pricing");
        assert_eq!(pricing.description.as_deref(), Some("Cost per model"));

        // Entry present in both manifests keeps its navigation breadcrumb
        // and gains the URL-list description.
        assert_eq!(pages[0].breadcrumb, vec!["Overview"]);
        assert_eq!(pages[0].description.as_deref(), Some("The product"));
    }

    #[test]
    fn url_list_accepts_bare_urls_and_paths() {
        let entries = parse_url_list(
            "https://docs.venice.ai/models/text\nguides/quickstart.mdx\n\n# heading ignored\n",
            "https://docs.venice.ai",
        );
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["models/text", "guides/quickstart"]);
    }

    #[test]
    fn external_links_are_skipped() {
        let nav = json!({
            "navigation": [
                { "group": "Links", "pages": ["overview/about", "https://status.example.com"] }
            ]
        });
        let pages = canonical_pages(&nav_manifests(nav), &config());
        assert_eq!(pages.len(), 1);
    }

    #[test]
    fn duplicate_nav_entries_keep_richer_record() {
        let nav = json!({
            "navigation": [
                { "pages": ["models/overview"] },
                { "group": "Models", "pages": ["models/overview"] }
            ]
        });
        let pages = canonical_pages(&nav_manifests(nav), &config());
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].breadcrumb, vec!["Models"]);
    }

    #[test]
    fn humanizes_titles() {
        assert_eq!(humanize_segment("getting-started"), "Getting Started");
        assert_eq!(humanize_segment("model_feature_suffix"), "Model Feature Suffix");
    }

    #[tokio::test]
    async fn fetch_degrades_on_bad_json() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path().join("cache")).unwrap();

        Mock::given(method("GET"))
            .and(path("/docs.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{ nope"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/llms.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("- [A](https://docs.venice.ai/a)\n"))
            .mount(&server)
            .await;

        let mut config = config();
        config.source.nav_manifest_url = format!("{}/docs.json", server.uri());
        config.source.url_list_url = format!("{}/llms.txt", server.uri());

        let client = crate::http_client(5).unwrap();
        let manifests = fetch_manifests(&client, &cache, &config, false).await;

        assert!(manifests.navigation.is_none());
        assert!(manifests.url_list.is_some());

        // The pipeline still gets a canonical list from the surviving side.
        let pages = canonical_pages(&manifests, &config);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].path, "a");
    }
}
