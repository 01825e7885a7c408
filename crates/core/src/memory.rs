//! In-process stores.
//!
//! Used by unit and property tests and by embedders without Postgres. Both stores
//! share one [`MemoryCatalog`] so type usage checks see the same data.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use locus_shared::types::{LocationId, LocationTypeId, PageRequest, PageResponse, PartitionKey};

use crate::error::{CatalogError, CatalogResult};
use crate::location::{
    AccessPath, LocationNode, LocationQuery, LocationStore, PathEdge, ResolvedLocation, Tombstones,
};
use crate::location_type::store::apply_empty_policy;
use crate::location_type::{EmptyResult, LocationTypeNode, TypeHierarchyStore, TypeLevel};

#[derive(Debug, Default)]
struct State {
    locations: BTreeMap<LocationId, LocationNode>,
    types: BTreeMap<LocationTypeId, LocationTypeNode>,
}

/// Shared backing state for the in-memory stores.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    state: Arc<RwLock<State>>,
}

impl MemoryCatalog {
    /// Empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Location store bound to `partition`.
    #[must_use]
    pub fn locations(&self, partition: &PartitionKey) -> MemoryLocationStore {
        MemoryLocationStore {
            catalog: self.clone(),
            partition: partition.clone(),
        }
    }

    /// Type store bound to `partition`.
    #[must_use]
    pub fn types(&self, partition: &PartitionKey) -> MemoryTypeStore {
        MemoryTypeStore {
            catalog: self.clone(),
            partition: partition.clone(),
        }
    }

    fn read(&self) -> CatalogResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| CatalogError::Store("memory catalog lock poisoned".to_string()))
    }

    fn write(&self) -> CatalogResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| CatalogError::Store("memory catalog lock poisoned".to_string()))
    }
}

/// Live rows first, then the most recently updated.
fn rank(deleted_at: Option<&DateTime<Utc>>, updated_at: DateTime<Utc>) -> (bool, DateTime<Utc>) {
    (deleted_at.is_none(), updated_at)
}

/// [`LocationStore`] over a [`MemoryCatalog`].
#[derive(Debug, Clone)]
pub struct MemoryLocationStore {
    catalog: MemoryCatalog,
    partition: PartitionKey,
}

impl MemoryLocationStore {
    fn scoped<'s>(&self, state: &'s State) -> impl Iterator<Item = &'s LocationNode> {
        state
            .locations
            .values()
            .filter(move |n| n.partition == self.partition)
    }
}

#[async_trait]
impl LocationStore for MemoryLocationStore {
    fn partition(&self) -> &PartitionKey {
        &self.partition
    }

    async fn get_by_id(
        &self,
        id: LocationId,
        tombstones: Tombstones,
    ) -> CatalogResult<Option<LocationNode>> {
        let state = self.catalog.read()?;
        Ok(state
            .locations
            .get(&id)
            .filter(|n| n.partition == self.partition && tombstones.admits(n.deleted_at.as_ref()))
            .cloned())
    }

    async fn get_by_partner_id(
        &self,
        partner_id: &str,
        tombstones: Tombstones,
    ) -> CatalogResult<Option<LocationNode>> {
        let state = self.catalog.read()?;
        Ok(self
            .scoped(&state)
            .filter(|n| n.partner_external_id == partner_id)
            .filter(|n| tombstones.admits(n.deleted_at.as_ref()))
            .max_by_key(|n| rank(n.deleted_at.as_ref(), n.updated_at))
            .cloned())
    }

    async fn get_many_by_ids(
        &self,
        ids: &[LocationId],
        tombstones: Tombstones,
    ) -> CatalogResult<Vec<LocationNode>> {
        let wanted: HashSet<_> = ids.iter().collect();
        let state = self.catalog.read()?;
        Ok(self
            .scoped(&state)
            .filter(|n| wanted.contains(&n.id) && tombstones.admits(n.deleted_at.as_ref()))
            .cloned()
            .collect())
    }

    async fn get_many_by_partner_ids(
        &self,
        partner_ids: &[String],
        tombstones: Tombstones,
    ) -> CatalogResult<Vec<LocationNode>> {
        let wanted: HashSet<&str> = partner_ids.iter().map(String::as_str).collect();
        let state = self.catalog.read()?;
        Ok(self
            .scoped(&state)
            .filter(|n| wanted.contains(n.partner_external_id.as_str()))
            .filter(|n| tombstones.admits(n.deleted_at.as_ref()))
            .cloned()
            .collect())
    }

    async fn get_org_root(&self) -> CatalogResult<Option<LocationNode>> {
        let state = self.catalog.read()?;
        Ok(self
            .scoped(&state)
            .find(|n| n.parent_id.is_none() && !n.is_deleted())
            .cloned())
    }

    async fn upsert(&self, nodes: &[ResolvedLocation]) -> CatalogResult<()> {
        let mut state = self.catalog.write()?;
        for resolved in nodes {
            let node = &resolved.node;
            if node.partition != self.partition {
                return Err(CatalogError::Store(format!(
                    "location {} belongs to partition {}",
                    node.id, node.partition
                )));
            }
            match state.locations.get_mut(&node.id) {
                Some(row) if resolved.persisted => {
                    row.name.clone_from(&node.name);
                    row.type_id = node.type_id;
                    row.parent_id = node.parent_id;
                    row.partner_external_id.clone_from(&node.partner_external_id);
                    row.partner_external_parent_id
                        .clone_from(&node.partner_external_parent_id);
                    row.is_archived = node.is_archived;
                    row.deleted_at = None;
                    row.updated_at = node.updated_at;
                }
                Some(_) => {
                    return Err(CatalogError::Store(format!(
                        "duplicate key: location {} already exists",
                        node.id
                    )));
                }
                None => {
                    state.locations.insert(node.id, node.clone());
                }
            }
        }
        Ok(())
    }

    async fn list_all(&self, tombstones: Tombstones) -> CatalogResult<Vec<LocationNode>> {
        let state = self.catalog.read()?;
        Ok(self
            .scoped(&state)
            .filter(|n| tombstones.admits(n.deleted_at.as_ref()))
            .cloned()
            .collect())
    }

    async fn list_subtree(&self, root_id: LocationId) -> CatalogResult<Vec<LocationNode>> {
        let state = self.catalog.read()?;
        let Some(root) = state
            .locations
            .get(&root_id)
            .filter(|n| n.partition == self.partition)
        else {
            return Ok(Vec::new());
        };
        let prefix = root.access_path.clone();
        Ok(self
            .scoped(&state)
            .filter(|n| !n.is_deleted() && n.access_path.starts_with(&prefix))
            .cloned()
            .collect())
    }

    async fn list_by_type_ids(
        &self,
        type_ids: &[LocationTypeId],
    ) -> CatalogResult<Vec<LocationNode>> {
        let state = self.catalog.read()?;
        Ok(self
            .scoped(&state)
            .filter(|n| !n.is_deleted() && type_ids.contains(&n.type_id))
            .cloned()
            .collect())
    }

    async fn page(
        &self,
        query: &LocationQuery,
        page: &PageRequest,
    ) -> CatalogResult<PageResponse<LocationNode>> {
        let needle = query.name_contains.as_ref().map(|s| s.to_lowercase());
        let state = self.catalog.read()?;
        let mut rows: Vec<LocationNode> = self
            .scoped(&state)
            .filter(|n| !n.is_deleted())
            .filter(|n| query.include_archived || !n.is_archived)
            .filter(|n| query.type_ids.contains(&n.type_id))
            .filter(|n| {
                needle
                    .as_ref()
                    .is_none_or(|s| n.name.to_lowercase().contains(s))
            })
            .filter(|n| {
                query
                    .location_ids
                    .as_ref()
                    .is_none_or(|ids| ids.contains(&n.id))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

        let total = rows.len() as u64;
        let data = rows
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(page.limit()).unwrap_or(usize::MAX))
            .collect();
        Ok(PageResponse::new(data, page, total))
    }

    async fn subtree_edges(&self, ids: &[LocationId]) -> CatalogResult<Vec<PathEdge>> {
        let state = self.catalog.read()?;
        let mut seen = HashSet::new();
        let mut queue: VecDeque<LocationId> = ids.iter().copied().collect();
        let mut edges = Vec::new();

        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            let Some(node) = state
                .locations
                .get(&id)
                .filter(|n| n.partition == self.partition)
            else {
                continue;
            };
            edges.push(PathEdge {
                id: node.id,
                parent_id: node.parent_id,
                access_path: node.access_path.clone(),
            });
            queue.extend(
                self.scoped(&state)
                    .filter(|n| n.parent_id == Some(id))
                    .map(|n| n.id),
            );
        }
        Ok(edges)
    }

    async fn write_access_paths(&self, paths: &[(LocationId, AccessPath)]) -> CatalogResult<()> {
        let mut state = self.catalog.write()?;
        for (id, path) in paths {
            if let Some(row) = state.locations.get_mut(id) {
                row.access_path = path.clone();
            }
        }
        Ok(())
    }

    async fn types_in_use(
        &self,
        type_ids: &[LocationTypeId],
    ) -> CatalogResult<HashSet<LocationTypeId>> {
        let state = self.catalog.read()?;
        Ok(self
            .scoped(&state)
            .filter(|n| !n.is_deleted() && type_ids.contains(&n.type_id))
            .map(|n| n.type_id)
            .collect())
    }

    async fn set_tombstone(
        &self,
        id: LocationId,
        deleted_at: Option<DateTime<Utc>>,
    ) -> CatalogResult<bool> {
        let mut state = self.catalog.write()?;
        match state
            .locations
            .get_mut(&id)
            .filter(|n| n.partition == self.partition)
        {
            Some(row) => {
                row.deleted_at = deleted_at;
                row.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_archived(&self, id: LocationId, is_archived: bool) -> CatalogResult<bool> {
        let mut state = self.catalog.write()?;
        match state
            .locations
            .get_mut(&id)
            .filter(|n| n.partition == self.partition)
        {
            Some(row) => {
                row.is_archived = is_archived;
                row.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// [`TypeHierarchyStore`] over a [`MemoryCatalog`].
#[derive(Debug, Clone)]
pub struct MemoryTypeStore {
    catalog: MemoryCatalog,
    partition: PartitionKey,
}

impl MemoryTypeStore {
    fn scoped<'s>(&self, state: &'s State) -> impl Iterator<Item = &'s LocationTypeNode> {
        state
            .types
            .values()
            .filter(move |t| t.partition == self.partition)
    }
}

#[async_trait]
impl TypeHierarchyStore for MemoryTypeStore {
    fn partition(&self) -> &PartitionKey {
        &self.partition
    }

    async fn get_by_id(
        &self,
        id: LocationTypeId,
        tombstones: Tombstones,
    ) -> CatalogResult<Option<LocationTypeNode>> {
        let state = self.catalog.read()?;
        Ok(state
            .types
            .get(&id)
            .filter(|t| t.partition == self.partition && tombstones.admits(t.deleted_at.as_ref()))
            .cloned())
    }

    async fn get_by_name(
        &self,
        name: &str,
        tombstones: Tombstones,
    ) -> CatalogResult<Option<LocationTypeNode>> {
        let state = self.catalog.read()?;
        Ok(self
            .scoped(&state)
            .filter(|t| t.name == name && tombstones.admits(t.deleted_at.as_ref()))
            .max_by_key(|t| rank(t.deleted_at.as_ref(), t.updated_at))
            .cloned())
    }

    async fn get_by_names(
        &self,
        names: &[String],
        empty: EmptyResult,
    ) -> CatalogResult<Vec<LocationTypeNode>> {
        let rows: Vec<LocationTypeNode> = {
            let state = self.catalog.read()?;
            self.scoped(&state)
                .filter(|t| t.deleted_at.is_none() && names.contains(&t.name))
                .cloned()
                .collect()
        };
        apply_empty_policy(rows, empty, || {
            format!("location types {}", names.join(", "))
        })
    }

    async fn get_by_parent_name(
        &self,
        parent_name: &str,
        empty: EmptyResult,
    ) -> CatalogResult<Vec<LocationTypeNode>> {
        let rows: Vec<LocationTypeNode> = {
            let state = self.catalog.read()?;
            self.scoped(&state)
                .filter(|t| t.deleted_at.is_none() && t.parent_name == parent_name)
                .cloned()
                .collect()
        };
        apply_empty_policy(rows, empty, || {
            format!("child types of {parent_name}")
        })
    }

    async fn list(&self) -> CatalogResult<Vec<LocationTypeNode>> {
        let state = self.catalog.read()?;
        Ok(self
            .scoped(&state)
            .filter(|t| t.deleted_at.is_none())
            .cloned()
            .collect())
    }

    async fn upsert(&self, types: &[LocationTypeNode]) -> CatalogResult<Vec<LocationTypeNode>> {
        let mut state = self.catalog.write()?;
        let mut stored = Vec::with_capacity(types.len());
        for ty in types {
            let existing = state
                .types
                .values()
                .filter(|t| t.partition == ty.partition && t.name == ty.name)
                .max_by_key(|t| rank(t.deleted_at.as_ref(), t.updated_at))
                .map(|t| t.id);
            let row = match existing.and_then(|id| state.types.get_mut(&id)) {
                Some(row) => {
                    row.display_name.clone_from(&ty.display_name);
                    row.parent_name.clone_from(&ty.parent_name);
                    row.parent_type_id = ty.parent_type_id;
                    row.is_archived = ty.is_archived;
                    row.deleted_at = None;
                    row.updated_at = ty.updated_at;
                    row.clone()
                }
                None => {
                    state.types.insert(ty.id, ty.clone());
                    ty.clone()
                }
            };
            stored.push(row);
        }
        Ok(stored)
    }

    async fn list_hierarchy(&self) -> CatalogResult<Vec<LocationTypeNode>> {
        let state = self.catalog.read()?;
        Ok(state
            .types
            .values()
            .filter(|t| t.deleted_at.is_none() && !t.is_archived)
            .cloned()
            .collect())
    }

    async fn write_levels(&self, levels: &[TypeLevel]) -> CatalogResult<()> {
        let mut state = self.catalog.write()?;
        for level in levels {
            if let Some(row) = state.types.get_mut(&level.id) {
                row.level = level.level;
                row.parent_type_id = level.parent_type_id;
            }
        }
        Ok(())
    }
}
