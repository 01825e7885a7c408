//! Partial tree views.
//!
//! A caller that may only see some locations still needs the path from the
//! root down to each of them. Ancestors outside the accessible set are
//! emitted as placeholders carrying ids and types but no name.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use locus_shared::types::{LocationId, LocationTypeId};

use super::types::{AccessPath, LocationNode};
use crate::error::{CatalogError, CatalogResult};

/// Name shown for ancestors the caller may not see.
pub const UNAUTHORIZED_NAME: &str = "UnAuthorized";

/// One node of a tree view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeLocation {
    /// Node id.
    pub id: LocationId,
    /// Name, or [`UNAUTHORIZED_NAME`] for placeholders.
    pub name: String,
    /// Location type.
    pub type_id: LocationTypeId,
    /// Parent pointer.
    pub parent_id: Option<LocationId>,
    /// Materialized path.
    pub access_path: AccessPath,
    /// True for placeholder ancestors.
    pub is_unauthorized: bool,
    /// True if the node's type has no child types.
    pub is_lowest_level: bool,
    /// Archived flag.
    pub is_archived: bool,
}

impl TreeLocation {
    fn from_node(node: &LocationNode, lowest: &HashSet<LocationTypeId>, authorized: bool) -> Self {
        Self {
            id: node.id,
            name: if authorized {
                node.name.clone()
            } else {
                UNAUTHORIZED_NAME.to_string()
            },
            type_id: node.type_id,
            parent_id: node.parent_id,
            access_path: node.access_path.clone(),
            is_unauthorized: !authorized,
            is_lowest_level: lowest.contains(&node.type_id),
            is_archived: node.is_archived,
        }
    }
}

/// Ancestor ids of `accessible` that are not accessible themselves.
#[must_use]
pub fn missing_ancestors(accessible: &[LocationNode]) -> Vec<LocationId> {
    let have: HashSet<LocationId> = accessible.iter().map(|n| n.id).collect();
    let mut missing: Vec<LocationId> = accessible
        .iter()
        .flat_map(|n| n.access_path.ids().iter().copied())
        .filter(|id| !have.contains(id))
        .collect();
    missing.sort_unstable();
    missing.dedup();
    missing
}

/// Builds a tree view from the accessible nodes and their loaded ancestors.
///
/// Output is ordered by depth, then name, so parents always precede
/// children.
///
/// # Errors
///
/// Returns [`CatalogError::NotFound`] if `accessible` is empty, and
/// [`CatalogError::Conflict`] if an ancestor on some access path was not
/// loaded.
pub fn build_tree(
    accessible: &[LocationNode],
    ancestors: &[LocationNode],
    lowest: &HashSet<LocationTypeId>,
) -> CatalogResult<Vec<TreeLocation>> {
    if accessible.is_empty() {
        return Err(CatalogError::NotFound(
            "no accessible locations for tree".to_string(),
        ));
    }

    let mut out: HashMap<LocationId, TreeLocation> = accessible
        .iter()
        .map(|n| (n.id, TreeLocation::from_node(n, lowest, true)))
        .collect();
    let loaded: HashMap<LocationId, &LocationNode> = ancestors.iter().map(|n| (n.id, n)).collect();

    for id in missing_ancestors(accessible) {
        let node = loaded.get(&id).ok_or_else(|| {
            CatalogError::Conflict(format!("ancestor location {id} is missing"))
        })?;
        out.insert(id, TreeLocation::from_node(node, lowest, false));
    }

    let mut tree: Vec<TreeLocation> = out.into_values().collect();
    tree.sort_by(|a, b| {
        a.access_path
            .len()
            .cmp(&b.access_path.len())
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.id.cmp(&b.id))
    });
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use locus_shared::types::PartitionKey;

    fn node(name: &str, type_id: LocationTypeId, path: &AccessPath) -> LocationNode {
        let now = Utc::now();
        LocationNode {
            id: path.last().unwrap(),
            partition: PartitionKey::new("p1").unwrap(),
            name: name.to_string(),
            type_id,
            parent_id: path.ids().iter().rev().nth(1).copied(),
            partner_external_id: name.to_string(),
            partner_external_parent_id: String::new(),
            access_path: path.clone(),
            is_archived: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_tree_fills_unauthorized_ancestors() {
        let (org, brand, center) = (LocationTypeId::new(), LocationTypeId::new(), LocationTypeId::new());
        let root = node("Org", org, &AccessPath::root(LocationId::new()));
        let b1 = node("Brand 1", brand, &root.access_path.child(LocationId::new()));
        let c1 = node("Center 1", center, &b1.access_path.child(LocationId::new()));
        let c2 = node("Center 2", center, &b1.access_path.child(LocationId::new()));

        let accessible = vec![c1.clone(), c2.clone()];
        assert_eq!(missing_ancestors(&accessible).len(), 2);

        let lowest = HashSet::from([center]);
        let tree = build_tree(&accessible, &[root.clone(), b1.clone()], &lowest).unwrap();

        assert_eq!(tree.len(), 4);
        assert_eq!(tree[0].id, root.id);
        assert!(tree[0].is_unauthorized);
        assert_eq!(tree[0].name, UNAUTHORIZED_NAME);
        assert_eq!(tree[1].id, b1.id);
        assert!(tree[1].is_unauthorized);
        assert!(!tree[1].is_lowest_level);
        assert_eq!(tree[2].name, "Center 1");
        assert!(!tree[2].is_unauthorized);
        assert!(tree[2].is_lowest_level);
        assert_eq!(tree[3].name, "Center 2");
    }

    #[test]
    fn test_tree_requires_accessible_nodes() {
        let err = build_tree(&[], &[], &HashSet::new()).unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[test]
    fn test_tree_reports_unloaded_ancestor() {
        let root = AccessPath::root(LocationId::new());
        let leaf = node("Leaf", LocationTypeId::new(), &root.child(LocationId::new()));

        let err = build_tree(&[leaf], &[], &HashSet::new()).unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(_)));
    }
}
