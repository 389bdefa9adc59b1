//! Markdown normalization for docsync.
//!
//! Two converters feed the merger:
//! - [`component`] lowers the docs repo's extended markdown (XML-like inline
//!   components) to plain markdown, leaving placeholder sentinels behind.
//! - [`html`] converts rendered HTML fragments to clean markdown.

pub mod component;
pub mod html;

pub use component::{ComponentDoc, PLACEHOLDER_PREFIX, convert_components, placeholder_sentinel};
pub use html::convert_html;
