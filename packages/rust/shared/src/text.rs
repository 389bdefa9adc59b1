//! Text utilities: normalization, content hashing, and token counting.
//!
//! `content_hash` is a pure function of the normalized markdown, so
//! re-running the pipeline on unchanged inputs reproduces identical
//! fingerprints.

use std::sync::LazyLock;

use sha2::{Digest, Sha256};
use tiktoken_rs::CoreBPE;

/// Shared BPE encoder. Building it can fail (missing vocabulary data), in
/// which case token counts fall back to the `len / 4` estimate.
static ENCODER: LazyLock<Option<CoreBPE>> = LazyLock::new(|| tiktoken_rs::cl100k_base().ok());

/// Collapse internal whitespace runs to a single space and lower-case.
///
/// This is the canonical input to content hashing and near-duplicate
/// comparison: formatting-only edits do not change a page's fingerprint.
pub fn normalize_for_hash(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// SHA-256 hex fingerprint of normalized markdown.
pub fn content_hash(markdown: &str) -> String {
    let normalized = normalize_for_hash(markdown);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Count tokens with the BPE encoder, falling back to [`estimate_tokens`].
pub fn count_tokens(text: &str) -> usize {
    match ENCODER.as_ref() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => estimate_tokens(text),
    }
}

/// Quick token estimate without full tokenization (avg 4 chars/token).
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace_and_case() {
        assert_eq!(
            normalize_for_hash("Hello   World\n\n  Again"),
            "hello world again"
        );
    }

    #[test]
    fn hash_is_stable_across_formatting() {
        let a = content_hash("# Title\n\nSome   text here.");
        let b = content_hash("# title\nSOME TEXT    here.");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn hash_differs_on_content_change() {
        assert_ne!(content_hash("alpha"), content_hash("beta"));
    }

    #[test]
    fn hash_matches_known_digest() {
        // sha256("hello world")
        assert_eq!(
            content_hash("Hello   World"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn token_count_nonzero_for_text() {
        let text = "The quick brown fox jumps over the lazy dog.";
        assert!(count_tokens(text) > 0);
        assert_eq!(estimate_tokens(text), text.len() / 4);
    }
}
