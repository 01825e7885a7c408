//! Location type repository: the Postgres [`TypeHierarchyStore`].

use std::collections::HashMap;

use async_trait::async_trait;
use sea_orm::sea_query::{Expr, NullOrdering, OnConflict};
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, Order, QueryFilter, QueryOrder, QuerySelect,
    Select, Set,
};

use locus_core::location::Tombstones;
use locus_core::location_type::store::apply_empty_policy;
use locus_core::location_type::{EmptyResult, LocationTypeNode, TypeHierarchyStore, TypeLevel};
use locus_core::{CatalogError, CatalogResult};
use locus_shared::types::{LocationTypeId, PartitionKey};

use super::{DEFAULT_CHUNK_SIZE, from_db_time, to_db_time};
use crate::entities::location_types::{self, Column};
use crate::error::{DbError, store_err};

/// Postgres-backed type store bound to one partition.
pub struct PgTypeStore<'c, C> {
    conn: &'c C,
    partition: PartitionKey,
    chunk_size: usize,
}

impl<'c, C: ConnectionTrait> PgTypeStore<'c, C> {
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

    fn scoped(&self) -> Select<location_types::Entity> {
        location_types::Entity::find().filter(Column::ResourcePath.eq(self.partition.as_str()))
    }
}

async fn fetch<C: ConnectionTrait>(
    conn: &C,
    select: Select<location_types::Entity>,
) -> CatalogResult<Vec<LocationTypeNode>> {
    select
        .all(conn)
        .await
        .map_err(store_err)?
        .into_iter()
        .map(|m| to_node(m).map_err(CatalogError::from))
        .collect()
}

/// Non-deleted, non-archived types of every partition visible to `conn`.
///
/// # Errors
///
/// Returns a store error if the query fails or a row is corrupt.
pub async fn list_hierarchy<C: ConnectionTrait>(conn: &C) -> CatalogResult<Vec<LocationTypeNode>> {
    let select = location_types::Entity::find()
        .filter(Column::DeletedAt.is_null())
        .filter(Column::IsArchived.eq(false))
        .order_by_asc(Column::ResourcePath)
        .order_by_asc(Column::Name);
    fetch(conn, select).await
}

/// Writes `level` and `parent_location_type_id` by id.
///
/// # Errors
///
/// Returns a store error if an update fails.
pub async fn write_levels<C: ConnectionTrait>(conn: &C, levels: &[TypeLevel]) -> CatalogResult<()> {
    for level in levels {
        location_types::Entity::update_many()
            .col_expr(Column::Level, Expr::value(level.level))
            .col_expr(
                Column::ParentLocationTypeId,
                Expr::value(level.parent_type_id.map(LocationTypeId::into_inner)),
            )
            .filter(Column::Id.eq(level.id.into_inner()))
            .exec(conn)
            .await
            .map_err(store_err)?;
    }
    Ok(())
}

fn admit(
    select: Select<location_types::Entity>,
    tombstones: Tombstones,
) -> Select<location_types::Entity> {
    match tombstones {
        Tombstones::Exclude => select.filter(Column::DeletedAt.is_null()),
        Tombstones::Include => select,
    }
}

fn to_node(model: location_types::Model) -> Result<LocationTypeNode, DbError> {
    let partition =
        PartitionKey::new(model.resource_path).ok_or_else(|| DbError::InvalidRow {
            table: "location_types",
            id: model.id,
            message: "blank resource_path".to_string(),
        })?;

    Ok(LocationTypeNode {
        id: LocationTypeId::from_uuid(model.id),
        partition,
        name: model.name,
        display_name: model.display_name,
        parent_name: model.parent_name,
        parent_type_id: model.parent_location_type_id.map(LocationTypeId::from_uuid),
        level: model.level,
        is_archived: model.is_archived,
        deleted_at: model.deleted_at.map(from_db_time),
        created_at: from_db_time(model.created_at),
        updated_at: from_db_time(model.updated_at),
    })
}

fn new_row(ty: &LocationTypeNode) -> location_types::ActiveModel {
    location_types::ActiveModel {
        id: Set(ty.id.into_inner()),
        resource_path: Set(ty.partition.as_str().to_string()),
        name: Set(ty.name.clone()),
        display_name: Set(ty.display_name.clone()),
        parent_name: Set(ty.parent_name.clone()),
        parent_location_type_id: Set(ty.parent_type_id.map(LocationTypeId::into_inner)),
        level: Set(ty.level),
        is_archived: Set(ty.is_archived),
        deleted_at: Set(None),
        created_at: Set(to_db_time(ty.created_at)),
        updated_at: Set(to_db_time(ty.updated_at)),
    }
}

/// `ON CONFLICT (name, resource_path)`: keep id, level and created_at;
/// refresh the rest and clear the tombstone.
fn refresh_on_conflict() -> OnConflict {
    OnConflict::columns([Column::Name, Column::ResourcePath])
        .update_columns([
            Column::DisplayName,
            Column::ParentName,
            Column::ParentLocationTypeId,
            Column::IsArchived,
            Column::DeletedAt,
            Column::UpdatedAt,
        ])
        .to_owned()
}

#[async_trait]
impl<C> TypeHierarchyStore for PgTypeStore<'_, C>
where
    C: ConnectionTrait + Send + Sync,
{
    fn partition(&self) -> &PartitionKey {
        &self.partition
    }

    async fn get_by_id(
        &self,
        id: LocationTypeId,
        tombstones: Tombstones,
    ) -> CatalogResult<Option<LocationTypeNode>> {
        let select = admit(self.scoped().filter(Column::Id.eq(id.into_inner())), tombstones);
        Ok(fetch(self.conn, select).await?.into_iter().next())
    }

    async fn get_by_name(
        &self,
        name: &str,
        tombstones: Tombstones,
    ) -> CatalogResult<Option<LocationTypeNode>> {
        let select = admit(self.scoped().filter(Column::Name.eq(name)), tombstones)
            .order_by_with_nulls(Column::DeletedAt, Order::Desc, NullOrdering::First)
            .limit(1);
        Ok(fetch(self.conn, select).await?.into_iter().next())
    }

    async fn get_by_names(
        &self,
        names: &[String],
        empty: EmptyResult,
    ) -> CatalogResult<Vec<LocationTypeNode>> {
        let mut rows = Vec::new();
        for chunk in names.chunks(self.chunk_size) {
            let select = self
                .scoped()
                .filter(Column::DeletedAt.is_null())
                .filter(Column::Name.is_in(chunk.iter().map(String::as_str)));
            rows.extend(fetch(self.conn, select).await?);
        }
        apply_empty_policy(rows, empty, || {
            format!("location types named {}", names.join(", "))
        })
    }

    async fn get_by_parent_name(
        &self,
        parent_name: &str,
        empty: EmptyResult,
    ) -> CatalogResult<Vec<LocationTypeNode>> {
        let select = self
            .scoped()
            .filter(Column::DeletedAt.is_null())
            .filter(Column::ParentName.eq(parent_name))
            .order_by_asc(Column::Name);
        let rows = fetch(self.conn, select).await?;
        apply_empty_policy(rows, empty, || {
            format!("location types with parent {parent_name}")
        })
    }

    async fn list(&self) -> CatalogResult<Vec<LocationTypeNode>> {
        let select = self
            .scoped()
            .filter(Column::DeletedAt.is_null())
            .order_by_asc(Column::Level)
            .order_by_asc(Column::Name);
        fetch(self.conn, select).await
    }

    async fn upsert(&self, types: &[LocationTypeNode]) -> CatalogResult<Vec<LocationTypeNode>> {
        if let Some(foreign) = types.iter().find(|t| t.partition != self.partition) {
            return Err(CatalogError::Store(format!(
                "location type {} belongs to partition {}",
                foreign.name, foreign.partition
            )));
        }

        let mut stored: HashMap<String, LocationTypeNode> = HashMap::with_capacity(types.len());
        for chunk in types.chunks(self.chunk_size) {
            location_types::Entity::insert_many(chunk.iter().map(new_row))
                .on_conflict(refresh_on_conflict())
                .exec_without_returning(self.conn)
                .await
                .map_err(store_err)?;

            let names: Vec<&str> = chunk.iter().map(|t| t.name.as_str()).collect();
            let select = self.scoped().filter(Column::Name.is_in(names));
            for row in fetch(self.conn, select).await? {
                stored.insert(row.name.clone(), row);
            }
        }

        types
            .iter()
            .map(|t| {
                stored.remove(&t.name).ok_or_else(|| {
                    CatalogError::Store(format!("location type {} was not written", t.name))
                })
            })
            .collect()
    }

    async fn list_hierarchy(&self) -> CatalogResult<Vec<LocationTypeNode>> {
        list_hierarchy(self.conn).await
    }

    async fn write_levels(&self, levels: &[TypeLevel]) -> CatalogResult<()> {
        write_levels(self.conn, levels).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn model(resource_path: &str) -> location_types::Model {
        let now = to_db_time(Utc::now());
        location_types::Model {
            id: Uuid::now_v7(),
            resource_path: resource_path.to_string(),
            name: "center".to_string(),
            display_name: "Center".to_string(),
            parent_name: "area".to_string(),
            parent_location_type_id: None,
            level: 3,
            is_archived: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_row_maps_to_node() {
        let row = model("manabie");
        let node = to_node(row.clone()).unwrap();

        assert_eq!(node.id.into_inner(), row.id);
        assert_eq!(node.parent_name, "area");
        assert_eq!(node.level, 3);
        assert!(!node.is_root());
    }

    #[test]
    fn test_blank_partition_is_rejected() {
        assert!(to_node(model("  ")).is_err());
    }

    #[test]
    fn test_new_row_never_carries_tombstone() {
        let mut node = to_node(model("manabie")).unwrap();
        node.deleted_at = Some(Utc::now());
        assert_eq!(new_row(&node).deleted_at, Set(None));
    }
}
