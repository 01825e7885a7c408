//! Type hierarchy store seam.

use async_trait::async_trait;

use locus_shared::types::{LocationTypeId, PartitionKey};

use super::types::{EmptyResult, LocationTypeNode, TypeLevel};
use crate::error::{CatalogError, CatalogResult};
use crate::location::Tombstones;

/// Persistence for location types. Lookups are scoped to one partition;
/// `list_hierarchy` and `write_levels` span the whole table.
#[async_trait]
pub trait TypeHierarchyStore: Send + Sync {
    /// The partition this store is bound to.
    fn partition(&self) -> &PartitionKey;

    /// Point lookup by id.
    async fn get_by_id(
        &self,
        id: LocationTypeId,
        tombstones: Tombstones,
    ) -> CatalogResult<Option<LocationTypeNode>>;

    /// Point lookup by name (case-sensitive).
    async fn get_by_name(
        &self,
        name: &str,
        tombstones: Tombstones,
    ) -> CatalogResult<Option<LocationTypeNode>>;

    /// Non-deleted types with any of `names`.
    async fn get_by_names(
        &self,
        names: &[String],
        empty: EmptyResult,
    ) -> CatalogResult<Vec<LocationTypeNode>>;

    /// Non-deleted types whose parent is `parent_name`.
    async fn get_by_parent_name(
        &self,
        parent_name: &str,
        empty: EmptyResult,
    ) -> CatalogResult<Vec<LocationTypeNode>>;

    /// Non-deleted types of the partition.
    async fn list(&self) -> CatalogResult<Vec<LocationTypeNode>>;

    /// Inserts or refreshes types keyed by `(name, partition)`, clearing any
    /// tombstone. Returns the stored rows in input order.
    async fn upsert(&self, types: &[LocationTypeNode]) -> CatalogResult<Vec<LocationTypeNode>>;

    /// Non-deleted, non-archived types of every partition.
    async fn list_hierarchy(&self) -> CatalogResult<Vec<LocationTypeNode>>;

    /// Bulk update of `level` and `parent_type_id`.
    async fn write_levels(&self, levels: &[TypeLevel]) -> CatalogResult<()>;
}

/// Applies an [`EmptyResult`] policy to a list lookup.
pub fn apply_empty_policy<T>(
    rows: Vec<T>,
    empty: EmptyResult,
    what: impl FnOnce() -> String,
) -> CatalogResult<Vec<T>> {
    if rows.is_empty() && empty == EmptyResult::Error {
        return Err(CatalogError::NotFound(what()));
    }
    Ok(rows)
}
