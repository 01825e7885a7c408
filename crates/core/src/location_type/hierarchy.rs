//! Type hierarchy algorithms.
//!
//! All functions here are pure: they take the type rows loaded by a
//! [`TypeHierarchyStore`](super::store::TypeHierarchyStore) and never touch
//! persistence.

use std::collections::{HashMap, HashSet, VecDeque};

use locus_shared::types::{LocationTypeId, PartitionKey};

use super::types::{LocationTypeNode, TypeLevel};
use crate::error::ValidationError;

/// Result of a level recompute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelPlan {
    /// Levels for every type reachable from a root type.
    pub levels: Vec<TypeLevel>,
    /// Types whose parent chain never reaches a root. Their stored level is
    /// left untouched.
    pub unreachable: Vec<LocationTypeId>,
}

impl LevelPlan {
    /// Entries that differ from what `stored` currently holds.
    #[must_use]
    pub fn changes(&self, stored: &[LocationTypeNode]) -> Vec<TypeLevel> {
        let current: HashMap<_, _> = stored
            .iter()
            .map(|t| (t.id, (t.level, t.parent_type_id)))
            .collect();
        self.levels
            .iter()
            .filter(|l| current.get(&l.id) != Some(&(l.level, l.parent_type_id)))
            .copied()
            .collect()
    }
}

/// Computes `level` and `parent_type_id` for every type in `types`.
///
/// Parent names resolve within the type's own partition. Roots (empty
/// `parent_name`) get level 0 and each child gets its parent's level plus
/// one, independent of input order.
#[must_use]
pub fn compute_levels(types: &[LocationTypeNode]) -> LevelPlan {
    let mut children: HashMap<(&PartitionKey, &str), Vec<&LocationTypeNode>> = HashMap::new();
    let mut queue = VecDeque::new();

    for ty in types {
        if ty.is_root() {
            queue.push_back((ty, 0_i32, None));
        } else {
            children
                .entry((&ty.partition, ty.parent_name.as_str()))
                .or_default()
                .push(ty);
        }
    }

    let mut seen = HashSet::new();
    let mut levels = Vec::with_capacity(types.len());

    while let Some((ty, level, parent_type_id)) = queue.pop_front() {
        if !seen.insert(ty.id) {
            continue;
        }
        levels.push(TypeLevel {
            id: ty.id,
            level,
            parent_type_id,
        });
        if let Some(kids) = children.get(&(&ty.partition, ty.name.as_str())) {
            for kid in kids {
                queue.push_back((kid, level + 1, Some(ty.id)));
            }
        }
    }

    let unreachable = types
        .iter()
        .filter(|ty| !seen.contains(&ty.id))
        .map(|ty| ty.id)
        .collect();

    LevelPlan {
        levels,
        unreachable,
    }
}

/// True if making `parent_name` the parent of `name` would close a cycle.
///
/// `parent_of` maps a type name to its current parent name; an empty string
/// means root.
pub fn creates_cycle<'a>(
    name: &str,
    parent_name: &'a str,
    parent_of: impl Fn(&str) -> Option<&'a str>,
) -> bool {
    let mut current = parent_name;
    let mut hops = HashSet::new();
    while !current.is_empty() {
        if current == name || !hops.insert(current) {
            return true;
        }
        match parent_of(current) {
            Some(next) => current = next,
            None => return false,
        }
    }
    false
}

/// Orders a linear type chain from root to leaf.
///
/// # Errors
///
/// Returns [`ValidationError::BrokenTypeChain`] if the types branch, have
/// more than one root, or contain a parent outside the chain.
pub fn sort_type_chain(
    types: Vec<LocationTypeNode>,
) -> Result<Vec<LocationTypeNode>, ValidationError> {
    if types.is_empty() {
        return Ok(types);
    }

    let names: HashSet<&str> = types.iter().map(|t| t.name.as_str()).collect();
    let mut root = None;
    let mut by_parent: HashMap<String, usize> = HashMap::new();

    for (idx, ty) in types.iter().enumerate() {
        if ty.parent_name.is_empty() || !names.contains(ty.parent_name.as_str()) {
            if root.replace(idx).is_some() {
                return Err(ValidationError::BrokenTypeChain);
            }
        } else if by_parent.insert(ty.parent_name.clone(), idx).is_some() {
            return Err(ValidationError::BrokenTypeChain);
        }
    }

    let Some(mut cursor) = root else {
        return Err(ValidationError::BrokenTypeChain);
    };
    let mut order = Vec::with_capacity(types.len());
    while order.len() <= types.len() {
        order.push(cursor);
        match by_parent.get(&types[cursor].name) {
            Some(&next) => cursor = next,
            None => break,
        }
    }
    if order.len() != types.len() {
        return Err(ValidationError::BrokenTypeChain);
    }

    let mut slots: Vec<Option<LocationTypeNode>> = types.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|idx| slots[idx].take())
        .collect())
}

/// Ids of the lowest-level types: non-deleted types that no other non-deleted
/// type of the same partition names as its parent.
#[must_use]
pub fn lowest_level_type_ids(types: &[LocationTypeNode]) -> Vec<LocationTypeId> {
    let parents: HashSet<(&PartitionKey, &str)> = types
        .iter()
        .filter(|t| t.deleted_at.is_none() && !t.is_root())
        .map(|t| (&t.partition, t.parent_name.as_str()))
        .collect();

    types
        .iter()
        .filter(|t| t.deleted_at.is_none())
        .filter(|t| !parents.contains(&(&t.partition, t.name.as_str())))
        .map(|t| t.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ty(name: &str, parent: &str) -> LocationTypeNode {
        let now = Utc::now();
        LocationTypeNode {
            id: LocationTypeId::new(),
            partition: PartitionKey::new("p1").unwrap(),
            name: name.to_string(),
            display_name: name.to_uppercase(),
            parent_name: parent.to_string(),
            parent_type_id: None,
            level: -1,
            is_archived: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn level_of(plan: &LevelPlan, id: LocationTypeId) -> Option<i32> {
        plan.levels.iter().find(|l| l.id == id).map(|l| l.level)
    }

    #[test]
    fn test_levels_follow_parent_chain_regardless_of_order() {
        let root = ty("org", "");
        let a = ty("brand", "org");
        let b = ty("area", "brand");
        let c = ty("center", "area");
        let shuffled = vec![c.clone(), a.clone(), root.clone(), b.clone()];

        let plan = compute_levels(&shuffled);

        assert_eq!(level_of(&plan, root.id), Some(0));
        assert_eq!(level_of(&plan, a.id), Some(1));
        assert_eq!(level_of(&plan, b.id), Some(2));
        assert_eq!(level_of(&plan, c.id), Some(3));
        assert!(plan.unreachable.is_empty());

        let c_level = plan.levels.iter().find(|l| l.id == c.id).unwrap();
        assert_eq!(c_level.parent_type_id, Some(b.id));
    }

    #[test]
    fn test_changes_skip_settled_rows() {
        let mut root = ty("org", "");
        root.level = 0;
        let a = ty("brand", "org");
        let types = vec![root.clone(), a.clone()];

        let plan = compute_levels(&types);
        let dirty = plan.changes(&types);

        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].id, a.id);
        assert_eq!(dirty[0].parent_type_id, Some(root.id));
    }

    #[test]
    fn test_levels_report_orphans() {
        let root = ty("org", "");
        let orphan = ty("floor", "building");

        let plan = compute_levels(&[root, orphan.clone()]);

        assert_eq!(plan.levels.len(), 1);
        assert_eq!(plan.unreachable, vec![orphan.id]);
    }

    #[test]
    fn test_levels_do_not_cross_partitions() {
        let root = ty("org", "");
        let mut foreign = ty("brand", "org");
        foreign.partition = PartitionKey::new("p2").unwrap();

        let plan = compute_levels(&[root, foreign.clone()]);

        assert_eq!(plan.unreachable, vec![foreign.id]);
    }

    #[test]
    fn test_creates_cycle() {
        let parents: HashMap<&str, &str> =
            [("org", ""), ("brand", "org"), ("area", "brand")].into();
        let lookup = |n: &str| parents.get(n).copied();

        assert!(creates_cycle("brand", "area", lookup));
        assert!(creates_cycle("area", "area", lookup));
        assert!(!creates_cycle("center", "area", lookup));
        assert!(!creates_cycle("area", "org", lookup));
    }

    #[test]
    fn test_sort_type_chain() {
        let sorted = sort_type_chain(vec![
            ty("center", "area"),
            ty("brand", "org"),
            ty("area", "brand"),
        ])
        .unwrap();

        let names: Vec<_> = sorted.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["brand", "area", "center"]);
    }

    #[test]
    fn test_sort_type_chain_rejects_branching() {
        let err = sort_type_chain(vec![
            ty("brand", "org"),
            ty("area", "brand"),
            ty("zone", "brand"),
        ])
        .unwrap_err();

        assert_eq!(err.to_string(), "wrong location_type");
    }

    #[test]
    fn test_sort_type_chain_rejects_two_roots() {
        let err = sort_type_chain(vec![ty("brand", "org"), ty("area", "zone")]).unwrap_err();
        assert_eq!(err, ValidationError::BrokenTypeChain);
    }

    #[test]
    fn test_lowest_level_types_are_leaves() {
        let root = ty("org", "");
        let brand = ty("brand", "org");
        let center = ty("center", "brand");
        let mut dead = ty("class", "center");
        dead.deleted_at = Some(Utc::now());

        let lowest = lowest_level_type_ids(&[root, brand, center.clone(), dead]);

        assert_eq!(lowest, vec![center.id]);
    }
}
