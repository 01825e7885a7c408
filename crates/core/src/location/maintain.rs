//! Path and level maintenance.
//!
//! The adjacency list (`parent_id`, `parent_name`) is authoritative. Access
//! paths and type levels are derived from it and rewritten here in bulk.

use std::collections::{HashMap, HashSet, VecDeque};

use locus_shared::types::LocationId;

use super::store::LocationStore;
use super::types::{AccessPath, PathEdge, Tombstones};
use crate::error::{CatalogError, CatalogResult};
use crate::location_type::{LevelPlan, TypeHierarchyStore, compute_levels};

/// Counters from one access path recompute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathRecompute {
    /// Nodes whose path was derived.
    pub visited: usize,
    /// Nodes whose stored path changed.
    pub rewritten: usize,
}

/// Derives access paths for `edges` from their parents.
///
/// `anchors` holds the current paths of parents that are not themselves in
/// `edges`. Returns only the paths that differ from what is stored.
///
/// # Errors
///
/// Returns [`CatalogError::Conflict`] if a parent is neither in `edges` nor
/// in `anchors`, or if some nodes are never reached (a parent cycle).
pub fn compute_access_paths(
    edges: &[PathEdge],
    anchors: &HashMap<LocationId, AccessPath>,
) -> CatalogResult<Vec<(LocationId, AccessPath)>> {
    let members: HashSet<LocationId> = edges.iter().map(|e| e.id).collect();
    let mut children: HashMap<LocationId, Vec<&PathEdge>> = HashMap::new();
    let mut queue = VecDeque::new();

    for edge in edges {
        match edge.parent_id {
            None => queue.push_back((edge, AccessPath::root(edge.id))),
            Some(parent) if members.contains(&parent) => {
                children.entry(parent).or_default().push(edge);
            }
            Some(parent) => {
                let anchor = anchors.get(&parent).ok_or_else(|| {
                    CatalogError::Conflict(format!(
                        "parent location {parent} of {} does not exist",
                        edge.id
                    ))
                })?;
                queue.push_back((edge, anchor.child(edge.id)));
            }
        }
    }

    let mut reached = HashSet::with_capacity(edges.len());
    let mut changed = Vec::new();
    while let Some((edge, path)) = queue.pop_front() {
        if !reached.insert(edge.id) {
            continue;
        }
        if let Some(kids) = children.get(&edge.id) {
            for &kid in kids {
                queue.push_back((kid, path.child(kid.id)));
            }
        }
        if path != edge.access_path {
            changed.push((edge.id, path));
        }
    }

    if reached.len() != members.len() {
        let mut stuck: Vec<String> = members
            .difference(&reached)
            .map(ToString::to_string)
            .collect();
        stuck.sort();
        return Err(CatalogError::Conflict(format!(
            "parent cycle among locations {}",
            stuck.join(", ")
        )));
    }
    Ok(changed)
}

/// Rewrites derived columns after structural changes.
pub struct PathMaintainer<'a> {
    locations: &'a dyn LocationStore,
    types: &'a dyn TypeHierarchyStore,
}

impl<'a> PathMaintainer<'a> {
    /// Creates a maintainer over the given stores.
    #[must_use]
    pub fn new(locations: &'a dyn LocationStore, types: &'a dyn TypeHierarchyStore) -> Self {
        Self { locations, types }
    }

    /// Recomputes access paths for `changed_ids` and all their descendants.
    ///
    /// All-or-nothing: nothing is written if any node cannot be placed.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Conflict`] for cycles or dangling parents and
    /// propagates store failures.
    pub async fn recompute_access_paths(
        &self,
        changed_ids: &[LocationId],
    ) -> CatalogResult<PathRecompute> {
        if changed_ids.is_empty() {
            return Ok(PathRecompute::default());
        }

        let edges = self.locations.subtree_edges(changed_ids).await?;
        let members: HashSet<LocationId> = edges.iter().map(|e| e.id).collect();
        let mut outside: Vec<LocationId> = edges
            .iter()
            .filter_map(|e| e.parent_id)
            .filter(|p| !members.contains(p))
            .collect();
        outside.sort_unstable();
        outside.dedup();

        let anchors: HashMap<LocationId, AccessPath> = self
            .locations
            .get_many_by_ids(&outside, Tombstones::Include)
            .await?
            .into_iter()
            .map(|n| (n.id, n.access_path))
            .collect();

        let changed = compute_access_paths(&edges, &anchors)?;
        if !changed.is_empty() {
            self.locations.write_access_paths(&changed).await?;
        }

        Ok(PathRecompute {
            visited: edges.len(),
            rewritten: changed.len(),
        })
    }

    /// Recomputes `level` and `parent_type_id` for the whole type table.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn recompute_type_levels(&self) -> CatalogResult<LevelPlan> {
        let types = self.types.list_hierarchy().await?;
        let plan = compute_levels(&types);

        let dirty = plan.changes(&types);
        if !dirty.is_empty() {
            self.types.write_levels(&dirty).await?;
        }

        Ok(plan)
    }
}
