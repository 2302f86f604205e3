//! # Domain - Version Graph Model
//!
//! A **domain** is a named, partitioned dataset. Its contents evolve through an
//! append-only chain of immutable versions, each either a self-contained
//! **base** or a **delta** against an older parent version.
//!
//! ```text
//!   v0 (base) <── v1 (delta) <── v2 (delta)
//!                        ^
//!                        └────── v3 (delta)        v4 (base) <── v5 (delta)
//! ```
//!
//! The graph is a forest of chains: every version has at most one parent and a
//! parent is always numerically older than its child, so every ancestry walk
//! terminates.
//!
//! ## Module Responsibilities
//!
//! | Module               | Purpose                                                  |
//! |---------------------|----------------------------------------------------------|
//! | [`version`]         | `DomainVersion`, `VersionProperties`, `PartitionInfo`    |
//! | [`graph`]           | `Domain`: arena of versions keyed by number, parent lookup |
//! | [`error`]           | `GraphError` for inconsistent or misused graphs          |
//! | [`coordinator`]     | `Coordinator` trait + in-memory implementation           |
//! | [`file_coordinator`] | JSON-per-domain coordinator with atomic rewrites        |
//!
//! Versions refer to their parents by number, never by reference. A defunct
//! version (remote data purged) stays in the arena so that its children can
//! still resolve their ancestry through it.

mod coordinator;
mod error;
mod file_coordinator;
mod graph;
mod version;

pub use coordinator::{Coordinator, MemoryCoordinator};
pub use error::GraphError;
pub use file_coordinator::FileCoordinator;
pub use graph::Domain;
pub use version::{now_millis, DomainVersion, PartitionInfo, VersionNumber, VersionProperties};
