//! Source fetchers for docsync.
//!
//! Each fetcher retrieves raw content for one upstream source and degrades
//! to an empty result on permanent failure, so the merge stage always sees
//! a total input. Retrieval is cached, retried with exponential backoff,
//! and bounded to a 30 s per-request timeout.

pub mod live;
pub mod manifests;
pub mod rendered;
pub mod repo;
pub mod retry;
pub mod spec;

use std::time::Duration;

use docsync_shared::{DocsyncError, Result};

pub use live::{catalog_markdown, fetch_models};
pub use manifests::{Manifests, canonical_pages, fetch_manifests};
pub use rendered::DynamicFetcher;
pub use repo::{RepoClient, RepoTree};
pub use spec::{SpecFetch, fetch_spec};

/// User-Agent string for all requests.
const USER_AGENT: &str = concat!("docsync/", env!("CARGO_PKG_VERSION"));

/// Build the shared HTTP client used by every fetcher family.
pub fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| DocsyncError::Network(format!("failed to build HTTP client: {e}")))
}
