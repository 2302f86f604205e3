//! # Updater - Incremental Partition Updates
//!
//! Moves one partition's on-disk state from whatever version it holds now to a
//! requested target version, transferring as little data as possible.
//!
//! ## Update Pipeline
//!
//! ```text
//!  detect current + cached versions
//!              |
//!              v
//!  compute_update_plan()  ──(nothing to do)──> return
//!              |
//!              v
//!  FETCH     _fetch_<uuid>/        missing base/deltas from remote
//!              |
//!              v
//!  COMMIT    cache/                fetched files, rename-with-overwrite
//!              |
//!              v
//!  APPLY     _update_work_<uuid>/  format merges base + deltas
//!              |
//!              v
//!  PROMOTE   root/* -> cache/, _update_work_<uuid>/* -> root/
//!              |
//!              v
//!  clean_cached_versions()  (always, even on failure)
//! ```
//!
//! ## Partition Directory Layout
//!
//! ```text
//! <partition root>/
//!   <current files>            format-specific, queryable
//!   cache/                     earlier bases and deltas kept for reuse
//!   _fetch_<uuid>/             only while fetching
//!   _update_work_<uuid>/       only while applying
//! ```
//!
//! The `_fetch_` and `_update_work_` prefixes are load-bearing: any directory
//! carrying them is leftover state from an interrupted attempt and is deleted
//! before the next attempt of the same phase starts.
//!
//! ## Module Responsibilities
//!
//! | Module         | Purpose                                                 |
//! |---------------|---------------------------------------------------------|
//! | [`plan`]      | `UpdatePlan` + `compute_update_plan()` (pure)           |
//! | [`partition`] | `PartitionFormat` hooks + `PartitionUpdater` pipeline    |
//! | [`workspace`] | Ephemeral workspaces, stale cleanup, file moves          |
//! | [`stats`]     | Named phase durations reported to the caller             |
//!
//! ## Concurrency
//!
//! A `PartitionUpdater` is driven through `&mut self`; at most one update per
//! partition root may be in flight. Nothing here takes a lock on the
//! directory, so two processes pointed at the same root will corrupt it.

mod partition;
mod plan;
mod stats;
pub mod workspace;

pub use partition::{PartitionFormat, PartitionUpdater};
pub use plan::{compute_update_plan, UpdatePlan};
pub use stats::{UpdateStatistics, EXECUTION_PHASE, FETCH_PHASE};

#[cfg(test)]
mod tests;
