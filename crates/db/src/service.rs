//! Transactional entry points for the location catalog.
//!
//! Every partition-bound call opens one transaction, sets the partition
//! context, runs the `locus-core` pipeline over [`PgLocationStore`] and
//! [`PgTypeStore`] bound to that transaction, and commits only when the
//! whole call succeeded. An early return or a dropped future rolls back.

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};
use serde::Serialize;
use tracing::{debug, info, warn};

use locus_core::location::csv_io::{export_locations, parse_locations};
use locus_core::location::{
    ImportReport, LocationCandidate, LocationNode, LocationStore, LowestLevelQuery,
    PathMaintainer, PathRecompute, Tombstones, TreeLocation, VisibilityFilter, location_tree,
    lowest_level_locations,
};
use locus_core::location_type::csv_io::{export_location_types, parse_location_types};
use locus_core::location_type::{
    ImportMode, LevelPlan, LocationTypeInput, LocationTypeNode, TypeHierarchyStore,
    TypeImportReport, compute_levels, sort_type_chain,
};
use locus_core::pipeline;
use locus_core::{CatalogError, CatalogResult, CsvError, RowViolation};
use locus_shared::config::CatalogConfig;
use locus_shared::types::{LocationId, PageRequest, PageResponse, PartitionKey};

use crate::error::store_err;
use crate::repositories::location_type::{list_hierarchy, write_levels};
use crate::repositories::{DEFAULT_CHUNK_SIZE, PgLocationStore, PgTypeStore};
use crate::rls::{RlsConnection, RlsExt};

/// Outcome of a location CSV import.
#[derive(Debug, Clone, Serialize)]
pub struct CsvImport {
    /// Per-row outcome of the decoded rows.
    pub report: ImportReport,
    /// Decode failures and rejections, by file row.
    pub violations: Vec<RowViolation>,
}

/// Outcome of a location type CSV import.
#[derive(Debug, Clone, Serialize)]
pub struct TypeCsvImport {
    /// Per-row outcome of the decoded rows.
    pub report: TypeImportReport,
    /// Decode failures and rejections, by file row.
    pub violations: Vec<RowViolation>,
}

/// Catalog operations over Postgres.
#[derive(Debug, Clone)]
pub struct CatalogService {
    db: DatabaseConnection,
    root_type_name: String,
    chunk_size: usize,
}

type Stores<'t> = (
    PgLocationStore<'t, DatabaseTransaction>,
    PgTypeStore<'t, DatabaseTransaction>,
);

impl CatalogService {
    /// Creates a service with the given catalog settings.
    #[must_use]
    pub fn new(db: DatabaseConnection, config: &CatalogConfig) -> Self {
        Self {
            db,
            root_type_name: config.root_type_name.clone(),
            chunk_size: if config.import_chunk_size == 0 {
                DEFAULT_CHUNK_SIZE
            } else {
                config.import_chunk_size
            },
        }
    }

    /// The underlying connection pool.
    #[must_use]
    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Name of the reserved root type.
    #[must_use]
    pub fn root_type_name(&self) -> &str {
        &self.root_type_name
    }

    async fn scope(&self, partition: &PartitionKey) -> CatalogResult<RlsConnection> {
        self.db.with_partition(partition).await.map_err(store_err)
    }

    fn stores<'t>(&self, txn: &'t DatabaseTransaction, partition: &PartitionKey) -> Stores<'t> {
        (
            PgLocationStore::new(txn, partition.clone()).with_chunk_size(self.chunk_size),
            PgTypeStore::new(txn, partition.clone()).with_chunk_size(self.chunk_size),
        )
    }

    /// Creates the root type and the partition root when missing.
    ///
    /// # Errors
    ///
    /// Returns a store error if the database fails.
    pub async fn bootstrap_partition(
        &self,
        partition: &PartitionKey,
        org_name: &str,
    ) -> CatalogResult<LocationNode> {
        let rls = self.scope(partition).await?;
        let (locations, types) = self.stores(rls.transaction(), partition);

        let root =
            pipeline::bootstrap_partition(&locations, &types, &self.root_type_name, org_name)
                .await?;

        rls.commit().await.map_err(store_err)?;
        info!(partition = %partition, root_id = %root.id, "Partition bootstrapped");
        Ok(root)
    }

    /// The partition root.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the partition has no live root.
    pub async fn get_location_org(&self, partition: &PartitionKey) -> CatalogResult<LocationNode> {
        let rls = self.scope(partition).await?;
        let (locations, _) = self.stores(rls.transaction(), partition);

        let root = locations.get_org_root().await?;

        rls.commit().await.map_err(store_err)?;
        root.ok_or_else(|| {
            CatalogError::NotFound(format!("org location of partition {partition}"))
        })
    }

    /// A non-deleted location by id.
    ///
    /// # Errors
    ///
    /// Returns a store error if the database fails.
    pub async fn get_location_by_id(
        &self,
        partition: &PartitionKey,
        id: LocationId,
    ) -> CatalogResult<Option<LocationNode>> {
        let rls = self.scope(partition).await?;
        let (locations, _) = self.stores(rls.transaction(), partition);

        let node = locations.get_by_id(id, Tombstones::Exclude).await?;

        rls.commit().await.map_err(store_err)?;
        Ok(node)
    }

    /// Reconciles and writes a location batch, then recomputes the access
    /// paths it touched, all in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` without a partition root. Store failures and path
    /// conflicts roll the whole batch back.
    pub async fn upsert_batch(
        &self,
        partition: &PartitionKey,
        candidates: &[LocationCandidate],
    ) -> CatalogResult<ImportReport> {
        let rls = self.scope(partition).await?;
        let (locations, types) = self.stores(rls.transaction(), partition);

        let outcome =
            pipeline::import_locations(&locations, &types, &self.root_type_name, candidates)
                .await
                .inspect_err(|e| {
                    warn!(partition = %partition, error = %e, "Location import aborted");
                })?;

        rls.commit().await.map_err(store_err)?;
        info!(
            partition = %partition,
            rows = candidates.len(),
            accepted = outcome.report.accepted_count(),
            rejected = candidates.len() - outcome.report.accepted_count(),
            paths_rewritten = outcome.paths_rewritten,
            "Location batch imported"
        );
        Ok(outcome.report)
    }

    /// Decodes a location CSV and imports the decodable rows.
    ///
    /// # Errors
    ///
    /// Returns a CSV error for an empty payload or a bad header, otherwise
    /// as [`upsert_batch`](Self::upsert_batch).
    pub async fn import_locations_csv(
        &self,
        partition: &PartitionKey,
        payload: &[u8],
    ) -> CatalogResult<CsvImport> {
        let batch = parse_locations(payload)?;
        if !batch.violations.is_empty() {
            debug!(
                partition = %partition,
                undecodable = batch.violations.len(),
                "Skipping rows that failed to decode"
            );
        }

        let report = self.upsert_batch(partition, &batch.candidates).await?;
        let violations = batch.violations_with(&report);
        Ok(CsvImport { report, violations })
    }

    /// Recomputes access paths of `changed_ids` and their descendants.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` for cycles or dangling parents; nothing is written.
    pub async fn recompute_access_paths(
        &self,
        partition: &PartitionKey,
        changed_ids: &[LocationId],
    ) -> CatalogResult<PathRecompute> {
        let rls = self.scope(partition).await?;
        let (locations, types) = self.stores(rls.transaction(), partition);

        let counts = PathMaintainer::new(&locations, &types)
            .recompute_access_paths(changed_ids)
            .await?;

        rls.commit().await.map_err(store_err)?;
        info!(
            partition = %partition,
            visited = counts.visited,
            rewritten = counts.rewritten,
            "Access paths recomputed"
        );
        Ok(counts)
    }

    /// Recomputes `level` and `parent_location_type_id` across the whole type
    /// table.
    ///
    /// Runs without a partition context, so the connecting role must not be
    /// subject to the partition policies (the table owner is not).
    ///
    /// # Errors
    ///
    /// Returns a store error if the database fails.
    pub async fn recompute_type_levels(&self) -> CatalogResult<LevelPlan> {
        let txn = self.db.begin().await.map_err(store_err)?;

        let types = list_hierarchy(&txn).await?;
        let plan = compute_levels(&types);
        let dirty = plan.changes(&types);
        if !dirty.is_empty() {
            write_levels(&txn, &dirty).await?;
        }

        txn.commit().await.map_err(store_err)?;
        if !plan.unreachable.is_empty() {
            warn!(
                unreachable = plan.unreachable.len(),
                "Location types without a path to a root type kept their level"
            );
        }
        info!(
            types = types.len(),
            rewritten = dirty.len(),
            "Location type levels recomputed"
        );
        Ok(plan)
    }

    /// Plans and writes a type batch, then recomputes levels.
    ///
    /// # Errors
    ///
    /// Under [`ImportMode::AllOrNothing`] the first rejected row aborts the
    /// call; store failures always do.
    pub async fn upsert_types(
        &self,
        partition: &PartitionKey,
        inputs: &[LocationTypeInput],
        mode: ImportMode,
    ) -> CatalogResult<TypeImportReport> {
        let rls = self.scope(partition).await?;
        let (locations, types) = self.stores(rls.transaction(), partition);

        let (report, levels) = pipeline::import_location_types(
            &types,
            &locations,
            &self.root_type_name,
            inputs,
            mode,
        )
        .await
        .inspect_err(|e| warn!(partition = %partition, error = %e, "Type import aborted"))?;

        rls.commit().await.map_err(store_err)?;
        info!(
            partition = %partition,
            rows = inputs.len(),
            clean = report.is_clean(),
            leveled = levels.levels.len(),
            "Location types imported"
        );
        Ok(report)
    }

    /// Decodes a type CSV and imports the decodable rows.
    ///
    /// # Errors
    ///
    /// Returns a CSV error for an empty payload or a bad header. Under
    /// [`ImportMode::AllOrNothing`] an undecodable row is an error too.
    pub async fn import_location_types_csv(
        &self,
        partition: &PartitionKey,
        payload: &[u8],
        mode: ImportMode,
    ) -> CatalogResult<TypeCsvImport> {
        let batch = parse_location_types(payload)?;
        if mode == ImportMode::AllOrNothing
            && let Some(first) = batch.violations.first()
        {
            return Err(CsvError::Malformed(first.to_string()).into());
        }

        let report = self
            .upsert_types(partition, &batch.input_records(), mode)
            .await?;
        let violations = batch.violations_with(&report);
        Ok(TypeCsvImport { report, violations })
    }

    /// Locations not hidden by their own or an ancestor's tombstone.
    ///
    /// # Errors
    ///
    /// Returns a store error if the database fails.
    pub async fn list_visible(
        &self,
        partition: &PartitionKey,
        filter: &VisibilityFilter,
    ) -> CatalogResult<Vec<LocationNode>> {
        let rls = self.scope(partition).await?;
        let (locations, _) = self.stores(rls.transaction(), partition);

        let nodes = locations.list_visible(filter).await?;

        rls.commit().await.map_err(store_err)?;
        Ok(nodes)
    }

    /// Non-deleted descendants of `root_id`, itself included.
    ///
    /// # Errors
    ///
    /// Returns a store error if the database fails.
    pub async fn list_subtree(
        &self,
        partition: &PartitionKey,
        root_id: LocationId,
    ) -> CatalogResult<Vec<LocationNode>> {
        let rls = self.scope(partition).await?;
        let (locations, _) = self.stores(rls.transaction(), partition);

        let nodes = locations.list_subtree(root_id).await?;

        rls.commit().await.map_err(store_err)?;
        Ok(nodes)
    }

    /// Tree view of `accessible_ids` with their ancestors filled in.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if none of the ids is visible.
    pub async fn location_tree(
        &self,
        partition: &PartitionKey,
        accessible_ids: &[LocationId],
    ) -> CatalogResult<Vec<TreeLocation>> {
        let rls = self.scope(partition).await?;
        let (locations, types) = self.stores(rls.transaction(), partition);

        let tree = location_tree(&locations, &types, accessible_ids).await?;

        rls.commit().await.map_err(store_err)?;
        Ok(tree)
    }

    /// Paginated locations whose type has no child type.
    ///
    /// # Errors
    ///
    /// Returns a store error if the database fails.
    pub async fn lowest_level_locations(
        &self,
        partition: &PartitionKey,
        query: &LowestLevelQuery,
        page: &PageRequest,
    ) -> CatalogResult<PageResponse<LocationNode>> {
        let rls = self.scope(partition).await?;
        let (locations, types) = self.stores(rls.transaction(), partition);

        let result = lowest_level_locations(&locations, &types, query, page).await?;

        rls.commit().await.map_err(store_err)?;
        Ok(result)
    }

    /// Tombstones a location. Its descendants become hidden without being
    /// touched.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id and `Conflict` for the partition
    /// root.
    pub async fn soft_delete(&self, partition: &PartitionKey, id: LocationId) -> CatalogResult<()> {
        let rls = self.scope(partition).await?;
        let (locations, _) = self.stores(rls.transaction(), partition);

        if locations
            .get_org_root()
            .await?
            .is_some_and(|root| root.id == id)
        {
            return Err(CatalogError::Conflict(format!(
                "org location {id} cannot be deleted"
            )));
        }
        if !locations.set_tombstone(id, Some(Utc::now())).await? {
            return Err(CatalogError::NotFound(format!("location {id}")));
        }

        rls.commit().await.map_err(store_err)?;
        info!(partition = %partition, location_id = %id, "Location deleted");
        Ok(())
    }

    /// Clears a location's own tombstone.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub async fn restore(&self, partition: &PartitionKey, id: LocationId) -> CatalogResult<()> {
        let rls = self.scope(partition).await?;
        let (locations, _) = self.stores(rls.transaction(), partition);

        if !locations.set_tombstone(id, None).await? {
            return Err(CatalogError::NotFound(format!("location {id}")));
        }

        rls.commit().await.map_err(store_err)?;
        info!(partition = %partition, location_id = %id, "Location restored");
        Ok(())
    }

    /// Sets the archived flag.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub async fn set_archived(
        &self,
        partition: &PartitionKey,
        id: LocationId,
        is_archived: bool,
    ) -> CatalogResult<()> {
        let rls = self.scope(partition).await?;
        let (locations, _) = self.stores(rls.transaction(), partition);

        if !locations.set_archived(id, is_archived).await? {
            return Err(CatalogError::NotFound(format!("location {id}")));
        }

        rls.commit().await.map_err(store_err)?;
        info!(
            partition = %partition,
            location_id = %id,
            is_archived,
            "Location archive flag set"
        );
        Ok(())
    }

    /// Non-deleted types of the partition.
    ///
    /// # Errors
    ///
    /// Returns a store error if the database fails.
    pub async fn list_location_types(
        &self,
        partition: &PartitionKey,
    ) -> CatalogResult<Vec<LocationTypeNode>> {
        let rls = self.scope(partition).await?;
        let (_, types) = self.stores(rls.transaction(), partition);

        let rows = types.list().await?;

        rls.commit().await.map_err(store_err)?;
        Ok(rows)
    }

    /// The partition's types ordered root to leaf.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the types do not form one chain.
    pub async fn sorted_location_types(
        &self,
        partition: &PartitionKey,
    ) -> CatalogResult<Vec<LocationTypeNode>> {
        let rows = self.list_location_types(partition).await?;
        Ok(sort_type_chain(rows)?)
    }

    /// Visible, non-root locations as CSV.
    ///
    /// # Errors
    ///
    /// Returns a store error if the database fails.
    pub async fn export_locations_csv(&self, partition: &PartitionKey) -> CatalogResult<Vec<u8>> {
        let rls = self.scope(partition).await?;
        let (locations, types) = self.stores(rls.transaction(), partition);

        let filter = VisibilityFilter {
            include_archived: true,
            ..VisibilityFilter::default()
        };
        let mut nodes = locations.list_visible(&filter).await?;
        nodes.retain(|n| n.parent_id.is_some());
        nodes.sort_by(|a, b| {
            a.access_path
                .len()
                .cmp(&b.access_path.len())
                .then_with(|| a.name.cmp(&b.name))
        });
        let type_names: HashMap<_, _> = types
            .list()
            .await?
            .into_iter()
            .map(|t| (t.id, t.name))
            .collect();

        rls.commit().await.map_err(store_err)?;
        Ok(export_locations(&nodes, &type_names)?)
    }

    /// The partition's types as CSV, ordered by level.
    ///
    /// # Errors
    ///
    /// Returns a store error if the database fails.
    pub async fn export_location_types_csv(
        &self,
        partition: &PartitionKey,
    ) -> CatalogResult<Vec<u8>> {
        let rows = self.list_location_types(partition).await?;
        Ok(export_location_types(&rows)?)
    }
}
