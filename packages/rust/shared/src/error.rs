//! Error types for docsync.
//!
//! Library crates use [`DocsyncError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all docsync operations.
#[derive(Debug, thiserror::Error)]
pub enum DocsyncError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while fetching a source.
    #[error("network error: {0}")]
    Network(String),

    /// YAML/JSON/frontmatter parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Cache store error.
    #[error("cache error: {0}")]
    Cache(String),

    /// Snapshot store error (load, save, or listing).
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (hash mismatch, malformed knowledge base, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Markdown/HTML conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DocsyncError>;

impl DocsyncError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = DocsyncError::config("missing repo owner");
        assert_eq!(err.to_string(), "config error: missing repo owner");

        let err = DocsyncError::validation("hash mismatch for overview/pricing");
        assert!(err.to_string().contains("overview/pricing"));
    }
}
