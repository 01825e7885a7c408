//! Read paths that combine both stores.

use std::collections::HashSet;

use locus_shared::types::{LocationId, PageRequest, PageResponse};

use super::store::{LocationQuery, LocationStore};
use super::tree::{TreeLocation, build_tree, missing_ancestors};
use super::types::{LocationNode, Tombstones};
use super::visibility;
use crate::error::CatalogResult;
use crate::location_type::{TypeHierarchyStore, lowest_level_type_ids};

/// Filters for [`lowest_level_locations`].
#[derive(Debug, Clone, Default)]
pub struct LowestLevelQuery {
    /// Case-insensitive substring of the name.
    pub name_contains: Option<String>,
    /// Restrict to these ids.
    pub location_ids: Option<Vec<LocationId>>,
}

/// Non-deleted, non-archived locations whose type has no child types.
///
/// # Errors
///
/// Propagates store failures.
pub async fn lowest_level_locations(
    locations: &dyn LocationStore,
    types: &dyn TypeHierarchyStore,
    query: &LowestLevelQuery,
    page: &PageRequest,
) -> CatalogResult<PageResponse<LocationNode>> {
    let type_ids = lowest_level_type_ids(&types.list().await?);
    if type_ids.is_empty() {
        return Ok(PageResponse::new(Vec::new(), page, 0));
    }

    let query = LocationQuery {
        type_ids,
        name_contains: query.name_contains.clone(),
        location_ids: query.location_ids.clone(),
        include_archived: false,
    };
    locations.page(&query, page).await
}

/// Tree view over `accessible_ids`, with unauthorized ancestors filled in.
///
/// Ids that are unknown or hidden by a tombstone are ignored.
///
/// # Errors
///
/// Returns `NotFound` if none of the ids is visible and propagates store
/// failures.
pub async fn location_tree(
    locations: &dyn LocationStore,
    types: &dyn TypeHierarchyStore,
    accessible_ids: &[LocationId],
) -> CatalogResult<Vec<TreeLocation>> {
    let candidates = locations
        .get_many_by_ids(accessible_ids, Tombstones::Exclude)
        .await?;
    let ancestor_ids = missing_ancestors(&candidates);
    let ancestors = locations
        .get_many_by_ids(&ancestor_ids, Tombstones::Include)
        .await?;

    let tombstoned = visibility::tombstoned_ids(&ancestors);
    let accessible: Vec<LocationNode> = candidates
        .into_iter()
        .filter(|n| !visibility::is_hidden(n, &tombstoned))
        .collect();

    let lowest: HashSet<_> = lowest_level_type_ids(&types.list().await?)
        .into_iter()
        .collect();
    build_tree(&accessible, &ancestors, &lowest)
}
