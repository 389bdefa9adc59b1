//! Core domain types for docsync knowledge bases.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version string recorded in `manifest.json` and snapshots.
pub const COLLECTOR_VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------------------------------------------------------
// SourceKind
// ---------------------------------------------------------------------------

/// The upstream source a piece of content was produced from.
///
/// Priority resolves conflicts when two sources claim the same slot for the
/// same page: spec > repo > rendered > live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// The OpenAPI specification.
    Spec,
    /// Structured markdown from the documentation repository.
    Repo,
    /// A rendered page scraped from the public documentation site.
    Rendered,
    /// The live service's model-listing endpoint.
    Live,
}

impl SourceKind {
    /// Merge priority — higher wins.
    pub fn priority(self) -> u8 {
        match self {
            Self::Spec => 100,
            Self::Repo => 80,
            Self::Rendered => 60,
            Self::Live => 40,
        }
    }

    /// Stable name used in page headers and the index.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Spec => "openapi-spec",
            Self::Repo => "docs-repo",
            Self::Rendered => "live-site",
            Self::Live => "live-api",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CanonicalPage
// ---------------------------------------------------------------------------

/// A unique page derived from the union of the navigation manifest and the
/// URL-list manifest. `path` is the primary key in every downstream structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalPage {
    /// Slash-delimited identifier, e.g. `api-reference/endpoint/chat/completions`.
    pub path: String,
    /// Display title (may be refined later from frontmatter).
    pub title: String,
    /// Public URL of the page on the documentation site.
    pub external_url: String,
    /// Short description, when the manifest carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Accumulated section names, outermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub breadcrumb: Vec<String>,
}

impl CanonicalPage {
    /// A record is "richer" than another when it carries more context.
    /// Used when both manifests define the same path.
    pub fn richness(&self) -> usize {
        self.breadcrumb.len()
            + usize::from(self.description.is_some())
            + usize::from(!self.title.is_empty())
    }
}

// ---------------------------------------------------------------------------
// RenderedPage
// ---------------------------------------------------------------------------

/// A fully-composed page, frozen once deduplication selects the survivor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedPage {
    /// Canonical page path.
    pub path: String,
    /// Plain markdown body (before header wrapping).
    pub markdown: String,
    /// Token count of the body.
    pub token_count: usize,
    /// SHA-256 of the normalized body.
    pub content_hash: String,
    /// Page title.
    pub title: String,
    /// Short summary, when a manifest carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Tags from frontmatter or the spec.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Which source won this page.
    pub source: SourceKind,
}

impl RenderedPage {
    /// Build a page, fingerprinting and token-counting the body.
    pub fn new(
        path: impl Into<String>,
        markdown: impl Into<String>,
        title: impl Into<String>,
        source: SourceKind,
    ) -> Self {
        let markdown = markdown.into();
        Self {
            content_hash: crate::text::content_hash(&markdown),
            token_count: crate::text::count_tokens(&markdown),
            path: path.into(),
            title: title.into(),
            description: None,
            tags: Vec::new(),
            source,
            markdown,
        }
    }

    /// Manifest entry for this page.
    pub fn metadata(&self) -> PageMetadata {
        PageMetadata {
            hash: self.content_hash.clone(),
            token_count: self.token_count,
            title: self.title.clone(),
            tags: self.tags.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Page manifest & snapshots
// ---------------------------------------------------------------------------

/// Per-page metadata recorded in a snapshot's page manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    /// SHA-256 of the normalized markdown.
    pub hash: String,
    /// Token count of the markdown body.
    pub token_count: usize,
    /// Page title.
    pub title: String,
    /// Tags carried over from frontmatter or the spec.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Versions of the upstream sources that went into a build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceVersions {
    /// Head commit of the documentation repository, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_commit: Option<String>,
    /// SHA-256 of the raw OpenAPI document, when fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_hash: Option<String>,
    /// When the rendered site was scraped, when it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrape_timestamp: Option<DateTime<Utc>>,
}

/// An immutable, timestamped record of one build's page manifest.
///
/// The manifest is a `BTreeMap` so serialization order is deterministic:
/// two builds over identical inputs produce byte-identical manifests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Timestamp identifier, e.g. `20250612_141503`.
    pub snapshot_id: String,
    /// When the snapshot was created.
    pub generated_at: DateTime<Utc>,
    /// Upstream source versions for this build.
    #[serde(default)]
    pub source_versions: SourceVersions,
    /// Page path → metadata.
    pub page_manifest: BTreeMap<String, PageMetadata>,
}

impl Snapshot {
    /// All page paths in this snapshot.
    pub fn page_paths(&self) -> impl Iterator<Item = &str> {
        self.page_manifest.keys().map(String::as_str)
    }
}
