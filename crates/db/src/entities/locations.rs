//! `SeaORM` Entity for locations table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "locations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub resource_path: String,
    pub name: String,
    pub location_type_id: Uuid,
    pub parent_location_id: Option<Uuid>,
    pub partner_internal_id: String,
    pub partner_internal_parent_id: String,
    #[sea_orm(column_type = "Text")]
    pub access_path: String,
    pub is_archived: bool,
    pub deleted_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::location_types::Entity",
        from = "Column::LocationTypeId",
        to = "super::location_types::Column::Id"
    )]
    LocationTypes,
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::ParentLocationId",
        to = "Column::Id"
    )]
    Parent,
}

impl Related<super::location_types::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LocationTypes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
