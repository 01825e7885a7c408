//! Database migration runner for Locus.
//!
//! Usage:
//!   migrator up      - Apply pending migrations
//!   migrator down    - Roll back the last migration
//!   migrator status  - Show migration status
//!   migrator fresh   - Drop the catalog tables and re-apply
//!
//! Reads `DATABASE_URL`, from `.env` when present.

use locus_db::migration::Migrator;
use sea_orm_migration::prelude::*;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // sea-orm-migration installs its own subscriber
    cli::run_cli(Migrator).await;
}
