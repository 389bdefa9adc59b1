//! Shared types, error model, and configuration for docsync.
//!
//! This crate is the foundation depended on by all other docsync crates.
//! It provides:
//! - [`DocsyncError`] — the unified error type
//! - Domain types ([`CanonicalPage`], [`Snapshot`], [`PageMetadata`], [`SourceKind`])
//! - Configuration ([`AppConfig`], [`FetchConfig`], config loading)
//! - Text utilities (normalization, content hashing, token counting)

pub mod config;
pub mod error;
pub mod text;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, DynamicConfig, FetchConfig, SourceConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{DocsyncError, Result};
pub use text::{content_hash, count_tokens, estimate_tokens, normalize_for_hash};
pub use types::{
    COLLECTOR_VERSION, CanonicalPage, PageMetadata, RenderedPage, Snapshot, SourceKind,
    SourceVersions,
};
