//! Location tree: nodes, reconciliation and path maintenance.
//!
//! Nodes are stored as an adjacency list (`parent_id`) with a materialized
//! [`AccessPath`]. Imports go through the [`ReconciliationEngine`], which
//! writes adjacency only; the [`PathMaintainer`] then derives the paths.

pub mod csv_io;
pub mod maintain;
pub mod query;
pub mod reconcile;
pub mod store;
pub mod tree;
pub mod types;
pub mod visibility;

#[cfg(test)]
mod reconcile_props;

pub use maintain::{PathMaintainer, PathRecompute, compute_access_paths};
pub use query::{LowestLevelQuery, location_tree, lowest_level_locations};
pub use reconcile::{BatchContext, ReconcileOutcome, ReconciliationEngine};
pub use store::{LocationQuery, LocationStore};
pub use tree::TreeLocation;
pub use types::{
    ACCESS_PATH_SEPARATOR, AccessPath, ImportReport, LocationCandidate, LocationNode, PathEdge,
    ResolvedLocation, RowOutcome, RowReport, Tombstones, VisibilityFilter,
};
