//! Catalog error types.
//!
//! `ValidationError` is scoped to one candidate record and never aborts a
//! batch on its own. `CatalogError` is what store and maintenance calls
//! return; a `Store` failure is always propagated to the caller untouched.

use locus_shared::AppError;
use thiserror::Error;

/// A single record failed a shape or invariant check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required column is empty.
    #[error("column {0} is required")]
    MissingField(&'static str),

    /// A text column is not valid UTF-8.
    #[error("{0} is not a valid UTF8 string")]
    InvalidUtf8(&'static str),

    /// The record names itself as its own parent.
    #[error("partner internal id {0} cannot be its own parent")]
    SelfParenting(String),

    /// The reserved root type cannot be assigned by an import.
    #[error("location type {0} is reserved for the organization root")]
    ReservedType(String),

    /// The location type does not exist.
    #[error("location type {0} does not exist")]
    UnknownType(String),

    /// The parent location could not be found in the store or the batch.
    #[error("missing parent location {0}")]
    MissingParent(String),

    /// The parent appears in the batch but was itself rejected.
    #[error("parent location {0} was rejected in this batch")]
    RejectedParent(String),

    /// The parent type exists only as a rejected row of the batch.
    #[error("parent location type {0} was rejected in this batch")]
    RejectedParentType(String),

    /// The `(type, parent type)` pair is not a registered hierarchy edge.
    #[error("location type {child} cannot be a child of location type {parent}")]
    InvalidTypeEdge {
        /// Candidate type name.
        child: String,
        /// Parent type name.
        parent: String,
    },

    /// The partner id was already accepted earlier in the batch.
    #[error("partner internal id {0} is duplicated")]
    DuplicatePartnerId(String),

    /// A type name appears more than once in the batch.
    #[error("location type name {0} is duplicated")]
    DuplicateTypeName(String),

    /// The new parent is one of the record's own descendants.
    #[error("{0} cannot be moved under one of its own descendants")]
    Cycle(String),

    /// The types do not form a single linear chain.
    #[error("wrong location_type")]
    BrokenTypeChain,

    /// `updated_at` is earlier than `created_at`.
    #[error("updated_at must not be earlier than created_at")]
    TimestampOrder,
}

/// File-level CSV failures. Row-level problems are reported per row instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CsvError {
    /// The payload has no header row.
    #[error("no data in csv file")]
    NoData,

    /// The header has the wrong number of columns.
    #[error("wrong number of columns, expected {expected}, got {got}")]
    ColumnCount {
        /// Expected column count.
        expected: usize,
        /// Actual column count.
        got: usize,
    },

    /// A header column has the wrong name.
    #[error("csv has invalid format, column number {position} should be {expected}, got {got}")]
    HeaderMismatch {
        /// 1-based column position.
        position: usize,
        /// Expected column name.
        expected: &'static str,
        /// Actual column name.
        got: String,
    },

    /// The reader or writer failed.
    #[error("csv error: {0}")]
    Malformed(String),
}

impl From<csv::Error> for CsvError {
    fn from(err: csv::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Errors returned by catalog stores and maintenance passes.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A record failed validation outside of a best-effort batch.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A CSV payload could not be read as a whole.
    #[error(transparent)]
    Csv(#[from] CsvError),

    /// A lookup found no matching row.
    #[error("not found: {0}")]
    NotFound(String),

    /// A structural change would violate a store-level invariant.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Underlying persistence failure.
    #[error("store error: {0}")]
    Store(String),
}

/// Result alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Validation(e) => Self::Validation(e.to_string()),
            CatalogError::Csv(e) => Self::Validation(e.to_string()),
            CatalogError::NotFound(msg) => Self::NotFound(msg),
            CatalogError::Conflict(msg) => Self::Conflict(msg),
            CatalogError::Store(msg) => Self::Store(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_messages_name_the_rule() {
        assert_eq!(
            ValidationError::MissingField("name").to_string(),
            "column name is required"
        );
        assert_eq!(
            ValidationError::DuplicatePartnerId("pIDA".into()).to_string(),
            "partner internal id pIDA is duplicated"
        );
        assert_eq!(
            ValidationError::InvalidTypeEdge {
                child: "center".into(),
                parent: "org".into(),
            }
            .to_string(),
            "location type center cannot be a child of location type org"
        );
    }

    #[test]
    fn test_catalog_error_maps_to_app_error() {
        let app: AppError = CatalogError::NotFound("org root".into()).into();
        assert_eq!(app.error_code(), "NOT_FOUND");

        let app: AppError = CatalogError::Validation(ValidationError::TimestampOrder).into();
        assert_eq!(app.error_code(), "VALIDATION_ERROR");

        let app: AppError = CatalogError::Store("connection reset".into()).into();
        assert!(app.is_retryable());
    }
}
