//! OpenAPI specification fetcher.
//!
//! Fetches a single URL and parses it as YAML when the suffix says so,
//! otherwise as JSON. The raw body's SHA-256 is recorded as the spec
//! version for snapshot provenance.

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{info, instrument};

use docsync_cache::{CacheMeta, CacheStore};
use docsync_shared::{DocsyncError, Result};

use crate::retry;

/// Cache kind for the spec document.
const CACHE_KIND: &str = "spec";

/// A fetched and parsed specification.
#[derive(Debug, Clone)]
pub struct SpecFetch {
    /// The parsed document.
    pub document: Value,
    /// SHA-256 of the raw body.
    pub spec_hash: String,
}

/// Fetch and parse the spec document.
#[instrument(skip(client, cache))]
pub async fn fetch_spec(
    client: &reqwest::Client,
    cache: &CacheStore,
    url: &str,
    force_refresh: bool,
) -> Result<SpecFetch> {
    let key = cache_key(url);

    let raw = if force_refresh {
        None
    } else {
        cache
            .read(CACHE_KIND, &key)
            .and_then(|(bytes, _)| String::from_utf8(bytes).ok())
    };

    let raw = match raw {
        Some(cached) => cached,
        None => {
            let body = retry::get_text(client, url).await?;
            cache.write(
                CACHE_KIND,
                &key,
                body.as_bytes(),
                &CacheMeta {
                    url: url.to_string(),
                    ..CacheMeta::default()
                },
            )?;
            body
        }
    };

    let document = parse_spec(url, &raw)?;

    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    let spec_hash = format!("{:x}", hasher.finalize());

    info!(spec_hash = %&spec_hash[..12], "fetched spec");
    Ok(SpecFetch { document, spec_hash })
}

/// Parse by suffix: `.yaml`/`.yml` → YAML, anything else → JSON.
fn parse_spec(url: &str, raw: &str) -> Result<Value> {
    let path = url.split('?').next().unwrap_or(url);
    if path.ends_with(".yaml") || path.ends_with(".yml") {
        serde_yaml::from_str(raw).map_err(|e| DocsyncError::parse(format!("{url}: {e}")))
    } else {
        serde_json::from_str(raw).map_err(|e| DocsyncError::parse(format!("{url}: {e}")))
    }
}

fn cache_key(url: &str) -> String {
    url.rsplit('/').next().unwrap_or("spec").to_string()
}
