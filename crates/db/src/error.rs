//! Database error types.

use locus_core::CatalogError;
use sea_orm::DbErr;
use thiserror::Error;

/// Failures raised while reading or writing catalog tables.
#[derive(Debug, Error)]
pub enum DbError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// A stored row cannot be turned into a catalog node.
    #[error("Invalid {table} row {id}: {message}")]
    InvalidRow {
        /// Table name.
        table: &'static str,
        /// Row id.
        id: uuid::Uuid,
        /// What is wrong with it.
        message: String,
    },
}

impl From<DbError> for CatalogError {
    fn from(err: DbError) -> Self {
        Self::Store(err.to_string())
    }
}

/// Maps a `SeaORM` failure to a store error.
pub(crate) fn store_err(err: DbErr) -> CatalogError {
    DbError::from(err).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_errors_become_store_errors() {
        let err = store_err(DbErr::Custom("connection reset".into()));
        assert!(matches!(err, CatalogError::Store(ref msg) if msg.contains("connection reset")));
    }

    #[test]
    fn test_invalid_row_names_table_and_id() {
        let id = uuid::Uuid::nil();
        let err: CatalogError = DbError::InvalidRow {
            table: "locations",
            id,
            message: "blank resource_path".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            format!("store error: Invalid locations row {id}: blank resource_path")
        );
    }
}
