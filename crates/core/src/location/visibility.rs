//! Tombstone propagation.
//!
//! Deleting a node never touches its descendants. A node is hidden when it or
//! any id on its access path carries a tombstone, so restoring an ancestor
//! brings back every descendant without a tombstone of its own.

use std::collections::HashSet;

use locus_shared::types::LocationId;

use super::types::{LocationNode, VisibilityFilter};

/// Ids of nodes carrying their own tombstone.
#[must_use]
pub fn tombstoned_ids(nodes: &[LocationNode]) -> HashSet<LocationId> {
    nodes
        .iter()
        .filter(|n| n.is_deleted())
        .map(|n| n.id)
        .collect()
}

/// True if `node` or one of its ancestors is in `tombstoned`.
#[must_use]
pub fn is_hidden(node: &LocationNode, tombstoned: &HashSet<LocationId>) -> bool {
    node.is_deleted() || node.access_path.ids().iter().any(|id| tombstoned.contains(id))
}

/// Drops hidden nodes, then applies `filter`.
#[must_use]
pub fn visible_nodes(all: Vec<LocationNode>, filter: &VisibilityFilter) -> Vec<LocationNode> {
    let tombstoned = tombstoned_ids(&all);
    all.into_iter()
        .filter(|n| !is_hidden(n, &tombstoned))
        .filter(|n| filter.matches(n))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::types::AccessPath;
    use chrono::Utc;
    use locus_shared::types::{LocationTypeId, PartitionKey};

    fn node(name: &str, path: &AccessPath) -> LocationNode {
        let now = Utc::now();
        let id = path.last().unwrap();
        LocationNode {
            id,
            partition: PartitionKey::new("p1").unwrap(),
            name: name.to_string(),
            type_id: LocationTypeId::new(),
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

    fn names(nodes: &[LocationNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.name.as_str()).collect()
    }

    #[test]
    fn test_tombstone_hides_subtree_and_restores() {
        let root_path = AccessPath::root(LocationId::new());
        let a_path = root_path.child(LocationId::new());
        let b_path = a_path.child(LocationId::new());
        let c_path = root_path.child(LocationId::new());

        let mut a = node("a", &a_path);
        a.deleted_at = Some(Utc::now());
        let all = vec![
            node("root", &root_path),
            a.clone(),
            node("b", &b_path),
            node("c", &c_path),
        ];

        let visible = visible_nodes(all.clone(), &VisibilityFilter::default());
        assert_eq!(names(&visible), vec!["root", "c"]);

        let restored: Vec<_> = all
            .into_iter()
            .map(|mut n| {
                if n.id == a.id {
                    n.deleted_at = None;
                }
                n
            })
            .collect();
        let visible = visible_nodes(restored, &VisibilityFilter::default());
        assert_eq!(names(&visible), vec!["root", "a", "b", "c"]);
    }

    #[test]
    fn test_own_tombstone_survives_ancestor_restore() {
        let root_path = AccessPath::root(LocationId::new());
        let a_path = root_path.child(LocationId::new());
        let b_path = a_path.child(LocationId::new());

        let mut b = node("b", &b_path);
        b.deleted_at = Some(Utc::now());
        let all = vec![node("root", &root_path), node("a", &a_path), b];

        let visible = visible_nodes(all, &VisibilityFilter::default());
        assert_eq!(names(&visible), vec!["root", "a"]);
    }

    #[test]
    fn test_filter_applies_after_visibility() {
        let root_path = AccessPath::root(LocationId::new());
        let mut archived = node("Archived Center", &root_path.child(LocationId::new()));
        archived.is_archived = true;
        let all = vec![
            node("root", &root_path),
            node("Main Center", &root_path.child(LocationId::new())),
            archived,
        ];

        let filter = VisibilityFilter {
            name_contains: Some("center".into()),
            ..VisibilityFilter::default()
        };
        assert_eq!(names(&visible_nodes(all.clone(), &filter)), vec!["Main Center"]);

        let filter = VisibilityFilter {
            include_archived: true,
            name_contains: Some("CENTER".into()),
            ..VisibilityFilter::default()
        };
        assert_eq!(visible_nodes(all, &filter).len(), 2);
    }
}
