//! End-to-end write paths over the store traits.
//!
//! Callers that need atomicity (the Postgres service) hand in stores bound
//! to one open transaction and commit only after these return `Ok`.

use chrono::Utc;

use locus_shared::types::{LocationId, LocationTypeId};

use crate::error::{CatalogError, CatalogResult};
use crate::location::{
    AccessPath, ImportReport, LocationCandidate, LocationNode, LocationStore, PathMaintainer,
    ReconciliationEngine, ResolvedLocation, Tombstones,
};
use crate::location_type::{
    ImportMode, LevelPlan, LocationTypeInput, LocationTypeNode, TypeHierarchyStore,
    TypeImportReport, TypeImporter,
};

/// Creates the reserved root type and the partition root if they are
/// missing. Returns the root.
///
/// # Errors
///
/// Propagates store failures.
pub async fn bootstrap_partition(
    locations: &dyn LocationStore,
    types: &dyn TypeHierarchyStore,
    root_type_name: &str,
    org_name: &str,
) -> CatalogResult<LocationNode> {
    if let Some(root) = locations.get_org_root().await? {
        return Ok(root);
    }

    let partition = locations.partition().clone();
    let now = Utc::now();
    let root_type = match types.get_by_name(root_type_name, Tombstones::Exclude).await? {
        Some(existing) => existing,
        None => {
            let fresh = LocationTypeNode {
                id: LocationTypeId::new(),
                partition: partition.clone(),
                name: root_type_name.to_string(),
                display_name: org_name.to_string(),
                parent_name: String::new(),
                parent_type_id: None,
                level: 0,
                is_archived: false,
                deleted_at: None,
                created_at: now,
                updated_at: now,
            };
            types
                .upsert(std::slice::from_ref(&fresh))
                .await?
                .into_iter()
                .next()
                .unwrap_or(fresh)
        }
    };

    let id = LocationId::new();
    let root = LocationNode {
        id,
        partition,
        name: org_name.to_string(),
        type_id: root_type.id,
        parent_id: None,
        partner_external_id: String::new(),
        partner_external_parent_id: String::new(),
        access_path: AccessPath::root(id),
        is_archived: false,
        deleted_at: None,
        created_at: now,
        updated_at: now,
    };
    locations
        .upsert(&[ResolvedLocation {
            node: root.clone(),
            persisted: false,
        }])
        .await?;
    Ok(root)
}

/// Summary of a location import.
#[derive(Debug, Clone, Default)]
pub struct LocationImport {
    /// Per-row outcome.
    pub report: ImportReport,
    /// Paths rewritten by the follow-up recompute.
    pub paths_rewritten: usize,
}

/// Reconciles `candidates`, writes the accepted rows and recomputes their
/// access paths.
///
/// # Errors
///
/// Returns `NotFound` if the partition has no root. Store failures and
/// path conflicts abort the whole call.
pub async fn import_locations(
    locations: &dyn LocationStore,
    types: &dyn TypeHierarchyStore,
    root_type_name: &str,
    candidates: &[LocationCandidate],
) -> CatalogResult<LocationImport> {
    let root = locations.get_org_root().await?.ok_or_else(|| {
        CatalogError::NotFound(format!("org root of partition {}", locations.partition()))
    })?;

    let engine = ReconciliationEngine::new(locations, types, root_type_name);
    let outcome = engine.reconcile(candidates, &root).await?;
    if outcome.accepted.is_empty() {
        return Ok(LocationImport {
            report: outcome.report,
            paths_rewritten: 0,
        });
    }

    locations.upsert(&outcome.accepted).await?;
    let recompute = PathMaintainer::new(locations, types)
        .recompute_access_paths(&outcome.changed_ids())
        .await?;

    Ok(LocationImport {
        report: outcome.report,
        paths_rewritten: recompute.rewritten,
    })
}

/// Plans and writes a type batch, then recomputes levels.
///
/// # Errors
///
/// Store failures abort the call; under [`ImportMode::AllOrNothing`] so
/// does the first rejected row.
pub async fn import_location_types(
    types: &dyn TypeHierarchyStore,
    locations: &dyn LocationStore,
    root_type_name: &str,
    inputs: &[LocationTypeInput],
    mode: ImportMode,
) -> CatalogResult<(TypeImportReport, LevelPlan)> {
    let plan = TypeImporter::new(types, locations, root_type_name)
        .plan(inputs, mode)
        .await?;
    if !plan.writes.is_empty() {
        types.upsert(&plan.writes).await?;
    }
    let levels = PathMaintainer::new(locations, types)
        .recompute_type_levels()
        .await?;
    Ok((plan.report, levels))
}
