//! Core pipeline for docsync: merge, deduplicate, build.
//!
//! The pipeline composes the source fetchers, converters, writer, and
//! diffing layers into one `build` operation. All components exchange only
//! immutable value objects; there is no shared mutable state.

pub mod dedup;
pub mod merger;
pub mod pipeline;

pub use dedup::{ContentSynthesizer, deduplicate};
pub use merger::{MergeInputs, merge};
pub use pipeline::{BuildOptions, BuildResult, ProgressReporter, SilentProgress, build};
