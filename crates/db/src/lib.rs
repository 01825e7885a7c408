//! Postgres persistence for the Locus location catalog.
//!
//! - `entities` - `SeaORM` models for `locations` and `location_types`
//! - `migration` - schema migrations
//! - `repositories` - the `locus-core` store traits over `SeaORM`
//! - `service` - [`CatalogService`], one transaction per call

pub mod entities;
pub mod error;
pub mod migration;
pub mod repositories;
pub mod rls;
pub mod service;

pub use error::DbError;
pub use repositories::{PgLocationStore, PgTypeStore};
pub use service::{CatalogService, CsvImport, TypeCsvImport};

use std::time::Duration;

use locus_shared::config::DatabaseConfig;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

/// Connects to the database with default pool settings.
///
/// # Errors
///
/// Returns an error if the connection fails.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    Database::connect(database_url).await
}

/// Connects using the pool settings from configuration.
///
/// # Errors
///
/// Returns an error if the connection fails.
pub async fn connect_with(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);
    Database::connect(options).await
}
