//! Rendered-page fetcher for JS-heavy documentation pages.
//!
//! Drives one shared headless browser: navigate, wait for the page to
//! settle, then wait (bounded) for one of the expected dynamic-content
//! selectors before reading the final serialized DOM. The browser child
//! process is owned by this fetcher and released on drop, failure paths
//! included.
//!
//! Fetching is total: when the browser is unavailable or any step fails,
//! the page degrades to the fallback string
//! `[Dynamic content — see <url>]` so downstream stages never see a hole.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use headless_chrome::{Browser, LaunchOptions};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use docsync_cache::{CacheMeta, CacheStore};

/// Cache kind for scraped pages.
const CACHE_KIND: &str = "web";

/// Fallback body emitted when rendering is unavailable.
pub fn fallback_content(url: &str) -> String {
    format!("[Dynamic content — see {url}]")
}

/// Lazily-launched browser shared by all rendered-page fetches in a build.
enum BrowserState {
    /// Not yet needed.
    Unstarted,
    /// Launched and usable.
    Ready(Arc<Browser>),
    /// Launch failed once; don't retry within this build.
    Unavailable,
}

/// Fetcher for dynamically-rendered documentation pages.
pub struct DynamicFetcher {
    cache: CacheStore,
    force_refresh: bool,
    skip: bool,
    wait_selector: String,
    wait_timeout: Duration,
    browser: Mutex<BrowserState>,
}

impl DynamicFetcher {
    pub fn new(
        cache: CacheStore,
        wait_selectors: &[String],
        wait_secs: u64,
        force_refresh: bool,
        skip: bool,
    ) -> Self {
        Self {
            cache,
            force_refresh,
            skip,
            // CSS selector list: first match of any selector ends the wait.
            wait_selector: wait_selectors.join(", "),
            wait_timeout: Duration::from_secs(wait_secs),
            browser: Mutex::new(BrowserState::Unstarted),
        }
    }

    /// Fetch the rendered DOM of one page. Never fails; the fallback string
    /// stands in for anything the browser could not produce.
    #[instrument(skip(self))]
    pub async fn fetch_page(&self, url: &str) -> String {
        if !self.force_refresh {
            if let Some((bytes, _)) = self.cache.read(CACHE_KIND, url) {
                if let Ok(html) = String::from_utf8(bytes) {
                    return html;
                }
            }
        }

        if self.skip {
            return fallback_content(url);
        }

        let Some(browser) = self.browser().await else {
            return fallback_content(url);
        };

        let rendered = {
            let url = url.to_string();
            let selector = self.wait_selector.clone();
            let timeout = self.wait_timeout;
            // The driver is synchronous; keep it off the async workers.
            tokio::task::spawn_blocking(move || render_page(&browser, &url, &selector, timeout))
                .await
        };

        match rendered {
            Ok(Ok(html)) => {
                if let Err(e) = self.cache.write(
                    CACHE_KIND,
                    url,
                    html.as_bytes(),
                    &CacheMeta {
                        url: url.to_string(),
                        ..CacheMeta::default()
                    },
                ) {
                    warn!(url, error = %e, "failed to cache rendered page");
                }
                info!(url, bytes = html.len(), "rendered page fetched");
                html
            }
            Ok(Err(e)) => {
                warn!(url, error = %e, "rendering failed, using fallback");
                fallback_content(url)
            }
            Err(e) => {
                warn!(url, error = %e, "render task failed, using fallback");
                fallback_content(url)
            }
        }
    }

    /// Fetch all pages serially through the shared browser. Keyed by URL.
    pub async fn fetch_all(&self, urls: &[String]) -> BTreeMap<String, String> {
        let mut results = BTreeMap::new();
        for url in urls {
            let html = self.fetch_page(url).await;
            results.insert(url.clone(), html);
        }
        results
    }

    async fn browser(&self) -> Option<Arc<Browser>> {
        let mut state = self.browser.lock().await;
        match &*state {
            BrowserState::Ready(browser) => Some(browser.clone()),
            BrowserState::Unavailable => None,
            BrowserState::Unstarted => {
                let launched = tokio::task::spawn_blocking(launch_browser).await;
                match launched {
                    Ok(Ok(browser)) => {
                        let browser = Arc::new(browser);
                        *state = BrowserState::Ready(browser.clone());
                        Some(browser)
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "headless browser unavailable, all dynamic pages fall back");
                        *state = BrowserState::Unavailable;
                        None
                    }
                    Err(e) => {
                        warn!(error = %e, "browser launch task failed");
                        *state = BrowserState::Unavailable;
                        None
                    }
                }
            }
        }
    }
}

fn launch_browser() -> anyhow::Result<Browser> {
    let options = LaunchOptions::default_builder()
        .headless(true)
        .build()
        .map_err(|e| anyhow::anyhow!("launch options: {e}"))?;
    Browser::new(options)
}

/// Navigate and read the final DOM. Runs on a blocking thread.
fn render_page(
    browser: &Browser,
    url: &str,
    wait_selector: &str,
    timeout: Duration,
) -> anyhow::Result<String> {
    let tab = browser.new_tab()?;
    tab.navigate_to(url)?;
    tab.wait_until_navigated()?;

    // Bounded wait for the dynamic fragments; a timeout is not fatal.
    if !wait_selector.is_empty() {
        if let Err(e) = tab.wait_for_element_with_custom_timeout(wait_selector, timeout) {
            warn!(url, error = %e, "timeout waiting for dynamic content");
        }
    }

    let html = tab.get_content()?;
    let _ = tab.close(true);
    Ok(html)
}
