//! Location repository: the Postgres [`LocationStore`].

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, Func, NullOrdering};
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, Order, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Select, Set,
};
use uuid::Uuid;

use locus_core::{CatalogError, CatalogResult};
use locus_core::location::{
    AccessPath, LocationNode, LocationQuery, LocationStore, PathEdge, ResolvedLocation,
    Tombstones,
};
use locus_shared::types::{LocationId, LocationTypeId, PageRequest, PageResponse, PartitionKey};

use super::{DEFAULT_CHUNK_SIZE, escape_like, from_db_time, to_db_time};
use crate::entities::locations::{self, Column};
use crate::error::{DbError, store_err};

/// Postgres-backed location store bound to one partition.
///
/// `C` is usually the open [`DatabaseTransaction`](sea_orm::DatabaseTransaction)
/// of a [`CatalogService`](crate::CatalogService) call.
pub struct PgLocationStore<'c, C> {
    conn: &'c C,
    partition: PartitionKey,
    chunk_size: usize,
}

impl<'c, C: ConnectionTrait> PgLocationStore<'c, C> {
    /// Creates a store over `conn`.
    #[must_use]
    pub fn new(conn: &'c C, partition: PartitionKey) -> Self {
        Self {
            conn,
            partition,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Caps the number of rows per statement.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn scoped(&self) -> Select<locations::Entity> {
        locations::Entity::find().filter(Column::ResourcePath.eq(self.partition.as_str()))
    }

    async fn fetch(&self, select: Select<locations::Entity>) -> CatalogResult<Vec<LocationNode>> {
        select
            .all(self.conn)
            .await
            .map_err(store_err)?
            .into_iter()
            .map(|m| to_node(m).map_err(CatalogError::from))
            .collect()
    }

    async fn update_existing(&self, node: &LocationNode) -> CatalogResult<()> {
        let row = locations::ActiveModel {
            name: Set(node.name.clone()),
            location_type_id: Set(node.type_id.into_inner()),
            parent_location_id: Set(node.parent_id.map(LocationId::into_inner)),
            partner_internal_id: Set(node.partner_external_id.clone()),
            partner_internal_parent_id: Set(node.partner_external_parent_id.clone()),
            is_archived: Set(node.is_archived),
            deleted_at: Set(None),
            updated_at: Set(to_db_time(node.updated_at)),
            ..Default::default()
        };

        let result = locations::Entity::update_many()
            .set(row)
            .filter(Column::Id.eq(node.id.into_inner()))
            .filter(Column::ResourcePath.eq(self.partition.as_str()))
            .exec(self.conn)
            .await
            .map_err(store_err)?;

        if result.rows_affected == 0 {
            return Err(CatalogError::Store(format!(
                "location {} vanished before update",
                node.id
            )));
        }
        Ok(())
    }
}

fn admit(select: Select<locations::Entity>, tombstones: Tombstones) -> Select<locations::Entity> {
    match tombstones {
        Tombstones::Exclude => select.filter(Column::DeletedAt.is_null()),
        Tombstones::Include => select,
    }
}

fn uuids<T: Copy + Into<Uuid>>(ids: &[T]) -> Vec<Uuid> {
    ids.iter().map(|&id| id.into()).collect()
}

fn invalid(id: Uuid, message: impl Into<String>) -> DbError {
    DbError::InvalidRow {
        table: "locations",
        id,
        message: message.into(),
    }
}

fn to_node(model: locations::Model) -> Result<LocationNode, DbError> {
    let partition = PartitionKey::new(model.resource_path)
        .ok_or_else(|| invalid(model.id, "blank resource_path"))?;
    let access_path: AccessPath = model
        .access_path
        .parse()
        .map_err(|e| invalid(model.id, format!("bad access_path: {e}")))?;

    Ok(LocationNode {
        id: LocationId::from_uuid(model.id),
        partition,
        name: model.name,
        type_id: LocationTypeId::from_uuid(model.location_type_id),
        parent_id: model.parent_location_id.map(LocationId::from_uuid),
        partner_external_id: model.partner_internal_id,
        partner_external_parent_id: model.partner_internal_parent_id,
        access_path,
        is_archived: model.is_archived,
        deleted_at: model.deleted_at.map(from_db_time),
        created_at: from_db_time(model.created_at),
        updated_at: from_db_time(model.updated_at),
    })
}

fn new_row(node: &LocationNode) -> locations::ActiveModel {
    locations::ActiveModel {
        id: Set(node.id.into_inner()),
        resource_path: Set(node.partition.as_str().to_string()),
        name: Set(node.name.clone()),
        location_type_id: Set(node.type_id.into_inner()),
        parent_location_id: Set(node.parent_id.map(LocationId::into_inner)),
        partner_internal_id: Set(node.partner_external_id.clone()),
        partner_internal_parent_id: Set(node.partner_external_parent_id.clone()),
        access_path: Set(node.access_path.to_string()),
        is_archived: Set(node.is_archived),
        deleted_at: Set(node.deleted_at.map(to_db_time)),
        created_at: Set(to_db_time(node.created_at)),
        updated_at: Set(to_db_time(node.updated_at)),
    }
}

#[async_trait]
impl<C> LocationStore for PgLocationStore<'_, C>
where
    C: ConnectionTrait + Send + Sync,
{
    fn partition(&self) -> &PartitionKey {
        &self.partition
    }

    async fn get_by_id(
        &self,
        id: LocationId,
        tombstones: Tombstones,
    ) -> CatalogResult<Option<LocationNode>> {
        let select = admit(self.scoped().filter(Column::Id.eq(id.into_inner())), tombstones);
        Ok(self.fetch(select).await?.into_iter().next())
    }

    async fn get_by_partner_id(
        &self,
        partner_id: &str,
        tombstones: Tombstones,
    ) -> CatalogResult<Option<LocationNode>> {
        let select = admit(
            self.scoped()
                .filter(Column::PartnerInternalId.eq(partner_id)),
            tombstones,
        )
        .order_by_with_nulls(Column::DeletedAt, Order::Desc, NullOrdering::First)
        .order_by_desc(Column::UpdatedAt)
        .limit(1);
        Ok(self.fetch(select).await?.into_iter().next())
    }

    async fn get_many_by_ids(
        &self,
        ids: &[LocationId],
        tombstones: Tombstones,
    ) -> CatalogResult<Vec<LocationNode>> {
        let mut nodes = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(self.chunk_size) {
            let select = admit(self.scoped().filter(Column::Id.is_in(uuids(chunk))), tombstones);
            nodes.extend(self.fetch(select).await?);
        }
        Ok(nodes)
    }

    async fn get_many_by_partner_ids(
        &self,
        partner_ids: &[String],
        tombstones: Tombstones,
    ) -> CatalogResult<Vec<LocationNode>> {
        let mut nodes = Vec::with_capacity(partner_ids.len());
        for chunk in partner_ids.chunks(self.chunk_size) {
            let select = admit(
                self.scoped()
                    .filter(Column::PartnerInternalId.is_in(chunk.iter().map(String::as_str))),
                tombstones,
            );
            nodes.extend(self.fetch(select).await?);
        }
        Ok(nodes)
    }

    async fn get_org_root(&self) -> CatalogResult<Option<LocationNode>> {
        let select = self
            .scoped()
            .filter(Column::ParentLocationId.is_null())
            .filter(Column::DeletedAt.is_null())
            .limit(1);
        Ok(self.fetch(select).await?.into_iter().next())
    }

    async fn upsert(&self, nodes: &[ResolvedLocation]) -> CatalogResult<()> {
        if let Some(foreign) = nodes.iter().find(|r| r.node.partition != self.partition) {
            return Err(CatalogError::Store(format!(
                "location {} belongs to partition {}",
                foreign.node.id, foreign.node.partition
            )));
        }

        for chunk in nodes.chunks(self.chunk_size) {
            let (existing, fresh): (Vec<_>, Vec<_>) = chunk.iter().partition(|r| r.persisted);

            if !fresh.is_empty() {
                locations::Entity::insert_many(fresh.iter().map(|r| new_row(&r.node)))
                    .exec_without_returning(self.conn)
                    .await
                    .map_err(store_err)?;
            }
            for resolved in existing {
                self.update_existing(&resolved.node).await?;
            }
        }
        Ok(())
    }

    async fn list_all(&self, tombstones: Tombstones) -> CatalogResult<Vec<LocationNode>> {
        self.fetch(admit(self.scoped(), tombstones).order_by_asc(Column::Id))
            .await
    }

    async fn list_subtree(&self, root_id: LocationId) -> CatalogResult<Vec<LocationNode>> {
        let Some(root) = self.get_by_id(root_id, Tombstones::Include).await? else {
            return Ok(Vec::new());
        };

        let select = self
            .scoped()
            .filter(Column::DeletedAt.is_null())
            .filter(Column::AccessPath.starts_with(root.access_path.to_string()))
            .order_by_asc(Column::AccessPath);
        let mut nodes = self.fetch(select).await?;
        // LIKE matches on text; keep only whole-segment prefixes.
        nodes.retain(|n| n.access_path.starts_with(&root.access_path));
        Ok(nodes)
    }

    async fn list_by_type_ids(
        &self,
        type_ids: &[LocationTypeId],
    ) -> CatalogResult<Vec<LocationNode>> {
        let mut nodes = Vec::new();
        for chunk in type_ids.chunks(self.chunk_size) {
            let select = self
                .scoped()
                .filter(Column::DeletedAt.is_null())
                .filter(Column::LocationTypeId.is_in(uuids(chunk)));
            nodes.extend(self.fetch(select).await?);
        }
        Ok(nodes)
    }

    async fn page(
        &self,
        query: &LocationQuery,
        page: &PageRequest,
    ) -> CatalogResult<PageResponse<LocationNode>> {
        if query.type_ids.is_empty() {
            return Ok(PageResponse::new(Vec::new(), page, 0));
        }

        let mut select = self
            .scoped()
            .filter(Column::DeletedAt.is_null())
            .filter(Column::LocationTypeId.is_in(uuids(&query.type_ids)));
        if !query.include_archived {
            select = select.filter(Column::IsArchived.eq(false));
        }
        if let Some(needle) = &query.name_contains {
            let pattern = format!("%{}%", escape_like(&needle.to_lowercase()));
            select = select.filter(Expr::expr(Func::lower(Expr::col(Column::Name))).like(pattern));
        }
        if let Some(ids) = &query.location_ids {
            select = select.filter(Column::Id.is_in(uuids(ids)));
        }

        let paginator = select
            .order_by_asc(Column::Name)
            .order_by_asc(Column::Id)
            .paginate(self.conn, page.limit());
        let total = paginator.num_items().await.map_err(store_err)?;
        let models = paginator
            .fetch_page(u64::from(page.page.saturating_sub(1)))
            .await
            .map_err(store_err)?;
        let data = models
            .into_iter()
            .map(|m| to_node(m).map_err(CatalogError::from))
            .collect::<CatalogResult<Vec<_>>>()?;

        Ok(PageResponse::new(data, page, total))
    }

    async fn subtree_edges(&self, ids: &[LocationId]) -> CatalogResult<Vec<PathEdge>> {
        let mut seen = HashSet::new();
        let mut edges = Vec::new();
        let mut frontier = Vec::new();

        for node in self.get_many_by_ids(ids, Tombstones::Include).await? {
            if seen.insert(node.id) {
                frontier.push(node.id);
                edges.push(edge(node));
            }
        }

        // Breadth-first over parent pointers, one level per round trip.
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for chunk in frontier.chunks(self.chunk_size) {
                let select = self
                    .scoped()
                    .filter(Column::ParentLocationId.is_in(uuids(chunk)));
                for node in self.fetch(select).await? {
                    if seen.insert(node.id) {
                        next.push(node.id);
                        edges.push(edge(node));
                    }
                }
            }
            frontier = next;
        }

        Ok(edges)
    }

    async fn write_access_paths(&self, paths: &[(LocationId, AccessPath)]) -> CatalogResult<()> {
        for (id, path) in paths {
            locations::Entity::update_many()
                .col_expr(Column::AccessPath, Expr::value(path.to_string()))
                .filter(Column::Id.eq(id.into_inner()))
                .filter(Column::ResourcePath.eq(self.partition.as_str()))
                .exec(self.conn)
                .await
                .map_err(store_err)?;
        }
        Ok(())
    }

    async fn types_in_use(
        &self,
        type_ids: &[LocationTypeId],
    ) -> CatalogResult<HashSet<LocationTypeId>> {
        let mut used = HashSet::new();
        for chunk in type_ids.chunks(self.chunk_size) {
            let rows: Vec<Uuid> = self
                .scoped()
                .filter(Column::DeletedAt.is_null())
                .filter(Column::LocationTypeId.is_in(uuids(chunk)))
                .select_only()
                .column(Column::LocationTypeId)
                .distinct()
                .into_tuple()
                .all(self.conn)
                .await
                .map_err(store_err)?;
            used.extend(rows.into_iter().map(LocationTypeId::from_uuid));
        }
        Ok(used)
    }

    async fn set_tombstone(
        &self,
        id: LocationId,
        deleted_at: Option<DateTime<Utc>>,
    ) -> CatalogResult<bool> {
        let result = locations::Entity::update_many()
            .col_expr(Column::DeletedAt, Expr::value(deleted_at.map(to_db_time)))
            .col_expr(Column::UpdatedAt, Expr::value(to_db_time(Utc::now())))
            .filter(Column::Id.eq(id.into_inner()))
            .filter(Column::ResourcePath.eq(self.partition.as_str()))
            .exec(self.conn)
            .await
            .map_err(store_err)?;
        Ok(result.rows_affected > 0)
    }

    async fn set_archived(&self, id: LocationId, is_archived: bool) -> CatalogResult<bool> {
        let result = locations::Entity::update_many()
            .col_expr(Column::IsArchived, Expr::value(is_archived))
            .col_expr(Column::UpdatedAt, Expr::value(to_db_time(Utc::now())))
            .filter(Column::Id.eq(id.into_inner()))
            .filter(Column::ResourcePath.eq(self.partition.as_str()))
            .exec(self.conn)
            .await
            .map_err(store_err)?;
        Ok(result.rows_affected > 0)
    }
}

fn edge(node: LocationNode) -> PathEdge {
    PathEdge {
        id: node.id,
        parent_id: node.parent_id,
        access_path: node.access_path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(resource_path: &str, access_path: &str) -> locations::Model {
        let now = to_db_time(Utc::now());
        locations::Model {
            id: Uuid::now_v7(),
            resource_path: resource_path.to_string(),
            name: "Center".to_string(),
            location_type_id: Uuid::now_v7(),
            parent_location_id: None,
            partner_internal_id: "c1".to_string(),
            partner_internal_parent_id: String::new(),
            access_path: access_path.to_string(),
            is_archived: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_row_maps_to_node() {
        let root = Uuid::now_v7();
        let mut row = model("manabie", &root.to_string());
        row.parent_location_id = Some(root);
        row.access_path = format!("{root}/{}", row.id);

        let node = to_node(row.clone()).unwrap();

        assert_eq!(node.id.into_inner(), row.id);
        assert_eq!(node.partition.as_str(), "manabie");
        assert_eq!(node.parent_id.map(LocationId::into_inner), Some(root));
        assert_eq!(node.access_path.len(), 2);
        assert_eq!(node.partner_external_id, "c1");
    }

    #[test]
    fn test_blank_partition_is_rejected() {
        let row = model("", &Uuid::now_v7().to_string());
        let err = to_node(row).unwrap_err();
        assert!(err.to_string().contains("blank resource_path"));
    }

    #[test]
    fn test_corrupt_access_path_is_rejected() {
        let row = model("manabie", "not/a/uuid");
        let err = to_node(row).unwrap_err();
        assert!(err.to_string().contains("bad access_path"));
    }

    #[test]
    fn test_new_row_keeps_provisional_path() {
        let node = to_node(model("manabie", &Uuid::now_v7().to_string())).unwrap();
        let row = new_row(&node);
        assert_eq!(row.access_path, Set(node.access_path.to_string()));
        assert_eq!(row.resource_path, Set("manabie".to_string()));
    }
}
