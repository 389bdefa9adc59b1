//! Snapshot persistence, diffing, and changelog rendering.
//!
//! Every build ends in an immutable [`Snapshot`](docsync_shared::Snapshot);
//! two snapshots diff into a severity-classified [`DiffReport`]; reports
//! accumulate into `CHANGELOG.md` / `CHANGELOG.json`.

pub mod changelog;
pub mod differ;
pub mod models;
pub mod snapshot;

pub use changelog::ChangelogWriter;
pub use differ::{PageContents, diff_snapshots, initial_build_report};
pub use models::{ChangeEntry, ChangeType, DiffReport, DiffStats, Severity};
pub use snapshot::SnapshotStore;
