//! Retry policy for source fetches.
//!
//! Exponential backoff: base 1 s, factor 2, at most 3 attempts. Transient
//! network errors, 5xx responses, and rate-limit 403s (carrying a known
//! header) are retried; 404 and 401 are final.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use docsync_shared::{DocsyncError, Result};

/// Maximum attempts per request.
pub const MAX_ATTEMPTS: u32 = 3;

/// First backoff delay; doubles per attempt.
const BASE_DELAY: Duration = Duration::from_secs(1);

/// Classified failure: transient errors are retried, permanent ones surface
/// immediately.
#[derive(Debug)]
pub enum Retry {
    Transient(DocsyncError),
    Permanent(DocsyncError),
}

/// Run `op` with the standard backoff policy.
pub async fn with_retry<T, Fut>(label: &str, op: impl FnMut() -> Fut) -> Result<T>
where
    Fut: Future<Output = std::result::Result<T, Retry>>,
{
    with_retry_delayed(label, BASE_DELAY, op).await
}

/// Backoff with an explicit base delay (shrunk in tests).
pub(crate) async fn with_retry_delayed<T, Fut>(
    label: &str,
    base_delay: Duration,
    mut op: impl FnMut() -> Fut,
) -> Result<T>
where
    Fut: Future<Output = std::result::Result<T, Retry>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(Retry::Permanent(e)) => return Err(e),
            Err(Retry::Transient(e)) => {
                if attempt >= MAX_ATTEMPTS {
                    return Err(e);
                }
                let delay = base_delay * 2u32.pow(attempt - 1);
                warn!(
                    label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient fetch error, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Classify an HTTP response status for retry purposes.
///
/// 5xx is transient. 403 is transient only when it looks like an upstream
/// rate limit (`x-ratelimit-remaining: 0` or a `retry-after` header); other
/// 4xx (404 and 401 included) are final.
pub fn classify_response(response: &reqwest::Response) -> Option<Retry> {
    let status = response.status();
    if status.is_success() {
        return None;
    }

    let error = DocsyncError::Network(format!("{}: HTTP {status}", response.url()));

    if status.is_server_error() {
        return Some(Retry::Transient(error));
    }

    if status == reqwest::StatusCode::FORBIDDEN && is_rate_limited(response.headers()) {
        return Some(Retry::Transient(error));
    }

    Some(Retry::Permanent(error))
}

fn is_rate_limited(headers: &reqwest::header::HeaderMap) -> bool {
    let remaining_zero = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "0");
    remaining_zero || headers.contains_key("retry-after")
}

/// Fetch a URL as text with the standard policy. Transport errors are
/// treated as transient.
pub async fn get_text(client: &reqwest::Client, url: &str) -> Result<String> {
    get_text_delayed(client, url, BASE_DELAY).await
}

pub(crate) async fn get_text_delayed(
    client: &reqwest::Client,
    url: &str,
    base_delay: Duration,
) -> Result<String> {
    with_retry_delayed(url, base_delay, || async {
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| Retry::Transient(DocsyncError::Network(format!("{url}: {e}"))))?;

        if let Some(retry) = classify_response(&response) {
            return Err(retry);
        }

        response
            .text()
            .await
            .map_err(|e| Retry::Transient(DocsyncError::Network(format!("{url}: body: {e}"))))
    })
    .await
}
