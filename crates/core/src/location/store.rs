//! Location store seam.
//!
//! A `LocationStore` is bound to one partition at construction. The Postgres
//! implementation lives in `locus-db`; `crate::memory` provides an in-process
//! one for tests and dry runs.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use locus_shared::types::{LocationId, LocationTypeId, PageRequest, PageResponse, PartitionKey};

use super::types::{
    AccessPath, LocationNode, PathEdge, ResolvedLocation, Tombstones, VisibilityFilter,
};
use super::visibility;
use crate::error::CatalogResult;

/// Predicates for paginated listing of non-deleted locations.
#[derive(Debug, Clone, Default)]
pub struct LocationQuery {
    /// Restrict to these types.
    pub type_ids: Vec<LocationTypeId>,
    /// Case-insensitive substring of the name.
    pub name_contains: Option<String>,
    /// Restrict to these ids.
    pub location_ids: Option<Vec<LocationId>>,
    /// Keep archived rows.
    pub include_archived: bool,
}

/// Persistence for location nodes of one partition.
#[async_trait]
pub trait LocationStore: Send + Sync {
    /// The partition this store is bound to.
    fn partition(&self) -> &PartitionKey;

    /// Point lookup by internal id.
    async fn get_by_id(
        &self,
        id: LocationId,
        tombstones: Tombstones,
    ) -> CatalogResult<Option<LocationNode>>;

    /// Point lookup by external key. With `Tombstones::Include`, a live row
    /// wins over tombstoned ones and newer tombstones win over older.
    async fn get_by_partner_id(
        &self,
        partner_id: &str,
        tombstones: Tombstones,
    ) -> CatalogResult<Option<LocationNode>>;

    /// Batch lookup by internal ids. Missing ids are skipped.
    async fn get_many_by_ids(
        &self,
        ids: &[LocationId],
        tombstones: Tombstones,
    ) -> CatalogResult<Vec<LocationNode>>;

    /// Batch lookup by external keys. May return several rows per key when
    /// tombstoned rows are included.
    async fn get_many_by_partner_ids(
        &self,
        partner_ids: &[String],
        tombstones: Tombstones,
    ) -> CatalogResult<Vec<LocationNode>>;

    /// The partition root: null parent pointer, reserved root type.
    async fn get_org_root(&self) -> CatalogResult<Option<LocationNode>>;

    /// Inserts new nodes and updates persisted ones. Does not touch the
    /// access path of existing rows or of any descendant.
    async fn upsert(&self, nodes: &[ResolvedLocation]) -> CatalogResult<()>;

    /// Every row of the partition.
    async fn list_all(&self, tombstones: Tombstones) -> CatalogResult<Vec<LocationNode>>;

    /// Non-deleted rows whose access path starts with the root's path.
    async fn list_subtree(&self, root_id: LocationId) -> CatalogResult<Vec<LocationNode>>;

    /// Non-deleted rows of the given types.
    async fn list_by_type_ids(
        &self,
        type_ids: &[LocationTypeId],
    ) -> CatalogResult<Vec<LocationNode>>;

    /// Paginated non-deleted rows matching `query`, ordered by name.
    async fn page(
        &self,
        query: &LocationQuery,
        page: &PageRequest,
    ) -> CatalogResult<PageResponse<LocationNode>>;

    /// Adjacency list of `ids` and their full descendant closure, walked
    /// through parent pointers (tombstoned rows included).
    async fn subtree_edges(&self, ids: &[LocationId]) -> CatalogResult<Vec<PathEdge>>;

    /// Overwrites stored access paths.
    async fn write_access_paths(&self, paths: &[(LocationId, AccessPath)]) -> CatalogResult<()>;

    /// Subset of `type_ids` referenced by at least one non-deleted row.
    async fn types_in_use(
        &self,
        type_ids: &[LocationTypeId],
    ) -> CatalogResult<HashSet<LocationTypeId>>;

    /// Sets or clears a node's own tombstone. Returns false if the id is unknown.
    async fn set_tombstone(
        &self,
        id: LocationId,
        deleted_at: Option<DateTime<Utc>>,
    ) -> CatalogResult<bool>;

    /// Sets the archived flag. Returns false if the id is unknown.
    async fn set_archived(&self, id: LocationId, is_archived: bool) -> CatalogResult<bool>;

    /// Rows visible under the ancestor-tombstone rule, then filtered.
    async fn list_visible(&self, filter: &VisibilityFilter) -> CatalogResult<Vec<LocationNode>> {
        let all = self.list_all(Tombstones::Include).await?;
        Ok(visibility::visible_nodes(all, filter))
    }
}
