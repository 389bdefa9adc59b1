//! Application configuration for docsync.
//!
//! User config lives at `~/.docsync/docsync.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets are never stored in the config — only the names of the
//! environment variables that hold them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DocsyncError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "docsync.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".docsync";

// ---------------------------------------------------------------------------
// Config structs (matching docsync.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Upstream source locations.
    #[serde(default)]
    pub source: SourceConfig,

    /// Dynamic (JS-rendered) page settings.
    #[serde(default)]
    pub dynamic: DynamicConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Knowledge base output directory.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Snapshot directory.
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: String,

    /// Cache directory.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    /// Maximum concurrent repo-file requests.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Jaccard similarity threshold for near-duplicate collapse.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            snapshot_dir: default_snapshot_dir(),
            cache_dir: default_cache_dir(),
            concurrency: default_concurrency(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

fn default_output_dir() -> String {
    "./knowledge_base".into()
}
fn default_snapshot_dir() -> String {
    "./snapshots".into()
}
fn default_cache_dir() -> String {
    "./.cache".into()
}
fn default_concurrency() -> u32 {
    16
}
fn default_similarity_threshold() -> f64 {
    0.8
}

/// `[source]` section — where the upstream product's documentation lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Repository owner on the code host.
    #[serde(default = "default_repo_owner")]
    pub repo_owner: String,

    /// Repository name.
    #[serde(default = "default_repo_name")]
    pub repo_name: String,

    /// Pinned branch.
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Subtree within the repository holding the documentation files.
    #[serde(default)]
    pub docs_path: String,

    /// File extensions treated as documentation pages.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Code host API base.
    #[serde(default = "default_repo_api_base")]
    pub repo_api_base: String,

    /// URL of the OpenAPI document (YAML or JSON).
    #[serde(default = "default_spec_url")]
    pub spec_url: String,

    /// URL of the navigation manifest (JSON).
    #[serde(default = "default_nav_manifest_url")]
    pub nav_manifest_url: String,

    /// URL of the URL-list manifest (text).
    #[serde(default = "default_url_list_url")]
    pub url_list_url: String,

    /// Base URL of the public documentation site.
    #[serde(default = "default_docs_base_url")]
    pub docs_base_url: String,

    /// Base URL of the live API.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Name of the env var holding the API key (never the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Name of the env var holding the repo host token.
    #[serde(default = "default_repo_token_env")]
    pub repo_token_env: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            repo_owner: default_repo_owner(),
            repo_name: default_repo_name(),
            branch: default_branch(),
            docs_path: String::new(),
            extensions: default_extensions(),
            repo_api_base: default_repo_api_base(),
            spec_url: default_spec_url(),
            nav_manifest_url: default_nav_manifest_url(),
            url_list_url: default_url_list_url(),
            docs_base_url: default_docs_base_url(),
            api_base_url: default_api_base_url(),
            api_key_env: default_api_key_env(),
            repo_token_env: default_repo_token_env(),
        }
    }
}

fn default_repo_owner() -> String {
    "veniceai".into()
}
fn default_repo_name() -> String {
    "api-docs".into()
}
fn default_branch() -> String {
    "main".into()
}
fn default_extensions() -> Vec<String> {
    vec![".mdx".into(), ".md".into()]
}
fn default_repo_api_base() -> String {
    "https://api.github.com".into()
}
fn raw_base() -> String {
    "https://raw.githubusercontent.com/veniceai/api-docs/main".into()
}
fn default_spec_url() -> String {
    format!("{}/swagger.yaml", raw_base())
}
fn default_nav_manifest_url() -> String {
    format!("{}/docs.json", raw_base())
}
fn default_url_list_url() -> String {
    format!("{}/llms.txt", raw_base())
}
fn default_docs_base_url() -> String {
    "https://docs.venice.ai".into()
}
fn default_api_base_url() -> String {
    "https://api.venice.ai/api/v1".into()
}
fn default_api_key_env() -> String {
    "DOCSYNC_API_KEY".into()
}
fn default_repo_token_env() -> String {
    "GITHUB_TOKEN".into()
}

/// `[dynamic]` section — pages whose content is loaded client-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicConfig {
    /// Site-relative paths that need a real browser.
    #[serde(default = "default_dynamic_pages")]
    pub pages: Vec<String>,

    /// CSS selectors whose appearance signals that dynamic content loaded.
    #[serde(default = "default_wait_selectors")]
    pub wait_selectors: Vec<String>,

    /// Upper bound in seconds for the dynamic-content wait.
    #[serde(default = "default_wait_secs")]
    pub wait_secs: u64,
}

impl Default for DynamicConfig {
    fn default() -> Self {
        Self {
            pages: default_dynamic_pages(),
            wait_selectors: default_wait_selectors(),
            wait_secs: default_wait_secs(),
        }
    }
}

fn default_dynamic_pages() -> Vec<String> {
    [
        "models/overview",
        "models/text",
        "models/image",
        "models/audio",
        "models/embeddings",
        "overview/pricing",
        "overview/beta-models",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_wait_selectors() -> Vec<String> {
    vec!["table".into(), ".model-name".into()]
}
fn default_wait_secs() -> u64 {
    10
}

// ---------------------------------------------------------------------------
// Fetch config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime fetch configuration — merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Bypass cache reads (still writes).
    pub force_refresh: bool,
    /// Skip the headless browser entirely; placeholders get the fallback.
    pub skip_dynamic: bool,
    /// Maximum concurrent repo-file requests.
    pub concurrency: u32,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            force_refresh: false,
            skip_dynamic: false,
            concurrency: config.defaults.concurrency,
            timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.docsync/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DocsyncError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.docsync/docsync.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DocsyncError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| DocsyncError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DocsyncError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DocsyncError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DocsyncError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

impl AppConfig {
    /// API key for the live endpoint, if the configured env var is set.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.source.api_key_env)
            .ok()
            .filter(|v| !v.is_empty())
    }

    /// Repo host token, if the configured env var is set.
    pub fn repo_token(&self) -> Option<String> {
        std::env::var(&self.source.repo_token_env)
            .ok()
            .filter(|v| !v.is_empty())
    }

    /// Public URL for a canonical page path.
    pub fn page_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.source.docs_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("output_dir"));
        assert!(toml_str.contains("spec_url"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.concurrency, 16);
        assert_eq!(parsed.source.branch, "main");
        assert_eq!(parsed.dynamic.wait_secs, 10);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
output_dir = "/tmp/kb"

[source]
repo_owner = "acme"
repo_name = "docs"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.output_dir, "/tmp/kb");
        assert_eq!(config.defaults.concurrency, 16);
        assert_eq!(config.source.repo_owner, "acme");
        assert_eq!(config.source.branch, "main");
    }

    #[test]
    fn fetch_config_from_app_config() {
        let app = AppConfig::default();
        let fetch = FetchConfig::from(&app);
        assert_eq!(fetch.concurrency, 16);
        assert_eq!(fetch.timeout_secs, 30);
        assert!(!fetch.force_refresh);
    }

    #[test]
    fn page_url_joins_cleanly() {
        let config = AppConfig::default();
        let url = config.page_url("/models/overview");
        assert_eq!(url, "https://docs.venice.ai/models/overview");
    }
}
