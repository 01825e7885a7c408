//! Location catalog schema.
//!
//! Creates `location_types` and `locations`, their indexes, and the
//! partition row-level security policies.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared(LOCATION_TYPES_SQL).await?;
        db.execute_unprepared(LOCATIONS_SQL).await?;
        db.execute_unprepared(RLS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared(DROP_SQL).await?;

        Ok(())
    }
}

const LOCATION_TYPES_SQL: &str = r"
-- ============================================================
-- LOCATION TYPES
-- parent_name is the authoritative edge; parent_location_type_id and
-- level are derived by the level recompute.
-- ============================================================

CREATE TABLE location_types (
    id UUID PRIMARY KEY,
    resource_path TEXT NOT NULL,
    name TEXT NOT NULL CHECK (name <> ''),
    display_name TEXT NOT NULL CHECK (display_name <> ''),
    parent_name TEXT NOT NULL DEFAULT '',
    parent_location_type_id UUID REFERENCES location_types(id) DEFERRABLE INITIALLY DEFERRED,
    level INTEGER NOT NULL DEFAULT 0,
    is_archived BOOLEAN NOT NULL DEFAULT false,
    deleted_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CHECK (name <> parent_name),
    CHECK (updated_at >= created_at),
    UNIQUE (name, resource_path)
);

CREATE INDEX idx_location_types_parent_name ON location_types(resource_path, parent_name)
    WHERE deleted_at IS NULL;
";

const LOCATIONS_SQL: &str = r"
-- ============================================================
-- LOCATIONS
-- Adjacency list (parent_location_id) plus materialized access_path,
-- stored as '/'-joined ids from the root down to the row itself.
-- ============================================================

CREATE TABLE locations (
    id UUID PRIMARY KEY,
    resource_path TEXT NOT NULL,
    name TEXT NOT NULL CHECK (name <> ''),
    location_type_id UUID NOT NULL REFERENCES location_types(id),
    parent_location_id UUID REFERENCES locations(id) DEFERRABLE INITIALLY DEFERRED,
    partner_internal_id TEXT NOT NULL DEFAULT '',
    partner_internal_parent_id TEXT NOT NULL DEFAULT '',
    access_path TEXT NOT NULL,
    is_archived BOOLEAN NOT NULL DEFAULT false,
    deleted_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CHECK (partner_internal_id = '' OR partner_internal_id <> partner_internal_parent_id),
    CHECK (updated_at >= created_at)
);

-- One live row per external key
CREATE UNIQUE INDEX uq_locations_partner_internal_id
    ON locations(partner_internal_id, resource_path)
    WHERE deleted_at IS NULL AND partner_internal_id <> '';

-- One live root per partition
CREATE UNIQUE INDEX uq_locations_partition_root
    ON locations(resource_path)
    WHERE parent_location_id IS NULL AND deleted_at IS NULL;

CREATE INDEX idx_locations_access_path ON locations(access_path text_pattern_ops);
CREATE INDEX idx_locations_parent ON locations(parent_location_id);
CREATE INDEX idx_locations_type ON locations(resource_path, location_type_id)
    WHERE deleted_at IS NULL;
";

const RLS_SQL: &str = r"
-- ============================================================
-- ROW-LEVEL SECURITY POLICIES
-- Application sets context per transaction:
--   SET LOCAL app.current_partition = '<partition>';
-- The table owner is not subject to these policies; the whole-table
-- level recompute relies on that.
-- ============================================================

ALTER TABLE location_types ENABLE ROW LEVEL SECURITY;
ALTER TABLE locations ENABLE ROW LEVEL SECURITY;

CREATE POLICY partition_isolation ON location_types
    USING (resource_path = current_setting('app.current_partition', true));

CREATE POLICY partition_isolation ON locations
    USING (resource_path = current_setting('app.current_partition', true));
";

const DROP_SQL: &str = r"
DROP TABLE IF EXISTS locations CASCADE;
DROP TABLE IF EXISTS location_types CASCADE;
";
