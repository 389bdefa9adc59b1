//! Page composition.
//!
//! For every canonical page: base markdown from the docs repo (or the spec
//! rendering, or the rendered site, in priority order), breadcrumb line,
//! placeholder substitution from rendered fragments, and endpoint
//! enrichment under the api-reference subtree. Pages no source can fill
//! appear as clearly-marked stubs.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info, instrument, warn};

use docsync_markdown::{PLACEHOLDER_PREFIX, convert_components, convert_html};
use docsync_openapi::{Endpoint, render_api_section, render_endpoint};
use docsync_shared::{CanonicalPage, RenderedPage, SourceKind};

/// Subtree whose pages are matched against spec endpoints.
const API_REFERENCE_PREFIX: &str = "api-reference/";

/// Everything the merger consumes, all immutable.
pub struct MergeInputs<'a> {
    /// Canonical page list; its order defines merge order.
    pub canonical: &'a [CanonicalPage],
    /// Canonical path → raw component-markdown from the docs repo.
    pub repo_pages: &'a HashMap<String, String>,
    /// Flattened spec endpoints.
    pub endpoints: &'a [Endpoint],
    /// Page URL → rendered HTML (or the dynamic-content fallback string).
    pub rendered: &'a BTreeMap<String, String>,
    /// Markdown for the live model-catalog page, when the live endpoint
    /// responded. Enters at the lowest priority.
    pub live_catalog: Option<&'a str>,
}

/// Path of the page synthesized from the live model catalog.
pub const LIVE_CATALOG_PATH: &str = "models/catalog";

/// Compose one [`RenderedPage`] per canonical page, in canonical order.
#[instrument(skip_all, fields(canonical = inputs.canonical.len()))]
pub fn merge(inputs: &MergeInputs<'_>) -> Vec<RenderedPage> {
    let mut pages: Vec<RenderedPage> = Vec::with_capacity(inputs.canonical.len());

    for canonical in inputs.canonical {
        pages.push(compose_page(canonical, inputs));
    }

    // The live catalog claims its slot only when no higher-priority source
    // already produced that page.
    if let Some(catalog) = inputs.live_catalog {
        if !pages.iter().any(|p| p.path == LIVE_CATALOG_PATH) {
            let mut page = RenderedPage::new(
                LIVE_CATALOG_PATH,
                format!("{}\n", catalog.trim_end()),
                "Model Catalog",
                SourceKind::Live,
            );
            page.tags = vec!["models".into(), "live".into()];
            pages.push(page);
        }
    }

    info!(page_count = pages.len(), "merge complete");
    pages
}

fn compose_page(canonical: &CanonicalPage, inputs: &MergeInputs<'_>) -> RenderedPage {
    let endpoint = find_endpoint(&canonical.path, inputs.endpoints);

    // Base slot: repo prose first, then the spec rendering, then the
    // rendered site, then a stub.
    let (mut markdown, mut title, mut tags, source) =
        match inputs.repo_pages.get(&canonical.path) {
            Some(raw) => {
                let doc = convert_components(raw);
                (
                    doc.markdown,
                    doc.title.unwrap_or_else(|| canonical.title.clone()),
                    doc.tags,
                    SourceKind::Repo,
                )
            }
            None => match endpoint {
                Some(endpoint) => {
                    let mut tags = endpoint.tags.clone();
                    tags.push(endpoint.method.as_str().to_lowercase());
                    (
                        render_endpoint(endpoint),
                        endpoint.title(),
                        tags,
                        SourceKind::Spec,
                    )
                }
                None => match inputs.rendered.get(&canonical.external_url) {
                    Some(html) => (
                        rendered_to_markdown(html, &canonical.external_url),
                        canonical.title.clone(),
                        Vec::new(),
                        SourceKind::Rendered,
                    ),
                    None => {
                        debug!(path = %canonical.path, "no source content, emitting stub");
                        (
                            format!(
                                "# {}\n\n> **Stub:** no source content is available for this page yet. See {}.\n",
                                canonical.title, canonical.external_url
                            ),
                            canonical.title.clone(),
                            vec!["stub".into()],
                            SourceKind::Repo,
                        )
                    }
                },
            },
        };

    // Breadcrumb line precedes the body.
    if !canonical.breadcrumb.is_empty() {
        markdown = format!("*{}*\n\n{}", canonical.breadcrumb.join(" > "), markdown);
    }

    // Placeholder slots are filled from the rendered site, matched by the
    // page's public URL. A missing match keeps a visible fallback rather
    // than silently dropping the slot.
    if markdown.contains(PLACEHOLDER_PREFIX) {
        markdown = substitute_placeholders(
            &markdown,
            inputs.rendered.get(&canonical.external_url).map(String::as_str),
            &canonical.external_url,
        );
    }

    // API-reference pages gain the spec's tables; the spec-sourced base
    // already is the spec rendering, so only other bases are enriched.
    if source != SourceKind::Spec && canonical.path.starts_with(API_REFERENCE_PREFIX) {
        if let Some(endpoint) = endpoint {
            markdown = format!(
                "{}\n\n## API Specification\n\n{}",
                markdown.trim_end(),
                render_api_section(endpoint)
            );
            if tags.is_empty() {
                tags = endpoint.tags.clone();
            }
        }
    }

    if title.is_empty() {
        title = canonical.title.clone();
    }

    let mut page = RenderedPage::new(
        canonical.path.clone(),
        format!("{}\n", markdown.trim_end()),
        title,
        source,
    );
    page.description = canonical.description.clone();
    page.tags = tags;
    page
}

/// Fill every `<!-- PLACEHOLDER: id -->` sentinel from the rendered page.
fn substitute_placeholders(markdown: &str, rendered: Option<&str>, url: &str) -> String {
    let replacement = match rendered {
        Some(html) => rendered_to_markdown(html, url),
        None => {
            warn!(url, "no rendered content for placeholder, inserting fallback");
            docsync_sources::rendered::fallback_content(url)
        }
    };

    let mut out = String::with_capacity(markdown.len() + replacement.len());
    for line in markdown.lines() {
        if line.trim_start().starts_with(PLACEHOLDER_PREFIX) {
            out.push_str(replacement.trim_end());
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

/// Convert rendered HTML to markdown; fallback strings pass through as-is.
fn rendered_to_markdown(html: &str, url: &str) -> String {
    if html.trim_start().starts_with("[Dynamic content") {
        return html.trim().to_string();
    }
    match convert_html(html) {
        Ok(markdown) => markdown,
        Err(e) => {
            warn!(url, error = %e, "rendered HTML unconvertible, inserting fallback");
            docsync_sources::rendered::fallback_content(url)
        }
    }
}

/// Match a page to at most one endpoint by normalized suffix comparison.
fn find_endpoint<'a>(path: &str, endpoints: &'a [Endpoint]) -> Option<&'a Endpoint> {
    if !path.starts_with(API_REFERENCE_PREFIX) {
        return None;
    }

    let page_slug = path
        .trim_start_matches(API_REFERENCE_PREFIX)
        .trim_start_matches("endpoint/")
        .replace(['/', '_'], "-")
        .to_lowercase();
    if page_slug.is_empty() {
        return None;
    }

    // Exact slug match first, then suffix containment either way.
    endpoints
        .iter()
        .find(|e| e.slug() == page_slug)
        .or_else(|| {
            endpoints
                .iter()
                .find(|e| e.slug().ends_with(&page_slug) || page_slug.ends_with(&e.slug()))
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
