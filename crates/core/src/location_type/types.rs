//! Location type node types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use locus_shared::types::{LocationTypeId, PartitionKey};

/// A persisted location type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationTypeNode {
    /// Internal identifier.
    pub id: LocationTypeId,
    /// Owning partition.
    pub partition: PartitionKey,
    /// Unique name within the partition.
    pub name: String,
    /// Human-readable label.
    pub display_name: String,
    /// Parent type name; empty for root types. Authoritative edge.
    pub parent_name: String,
    /// Parent type id derived from `parent_name`.
    pub parent_type_id: Option<LocationTypeId>,
    /// Distance from a root type.
    pub level: i32,
    /// Soft visibility flag.
    pub is_archived: bool,
    /// Tombstone.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl LocationTypeNode {
    /// True for types without a parent.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_name.is_empty()
    }
}

/// One record of a type import batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationTypeInput {
    /// Type name.
    pub name: String,
    /// Human-readable label.
    pub display_name: String,
    /// Parent type name; empty for a root type.
    pub parent_name: String,
    /// Soft visibility flag.
    #[serde(default)]
    pub is_archived: bool,
}

impl LocationTypeInput {
    /// Convenience constructor.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        parent_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            parent_name: parent_name.into(),
            is_archived: false,
        }
    }
}

/// What a list lookup should do when nothing matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyResult {
    /// Return an empty list.
    #[default]
    Allow,
    /// Return `CatalogError::NotFound`.
    Error,
}

/// How a type batch treats per-record failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Report failures per record and write the rest.
    BestEffort,
    /// Abort the whole call on the first failure.
    AllOrNothing,
}

/// Result of the level fixpoint for one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeLevel {
    /// Type id.
    pub id: LocationTypeId,
    /// Computed level.
    pub level: i32,
    /// Parent id resolved from `parent_name`.
    pub parent_type_id: Option<LocationTypeId>,
}

/// Outcome of one type input row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TypeRowOutcome {
    /// Row written.
    Accepted {
        /// Type id assigned or reused.
        type_id: LocationTypeId,
    },
    /// Row rejected.
    Rejected {
        /// Human-readable reason.
        message: String,
    },
}

/// Per-row report for a type batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeRowReport {
    /// 1-based data row number.
    pub row_number: usize,
    /// Type name as supplied.
    pub name: String,
    /// Outcome.
    #[serde(flatten)]
    pub outcome: TypeRowOutcome,
}

/// Report for a whole type batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeImportReport {
    /// One entry per input row.
    pub rows: Vec<TypeRowReport>,
}

impl TypeImportReport {
    /// True if every row was accepted.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.rows
            .iter()
            .all(|r| matches!(r.outcome, TypeRowOutcome::Accepted { .. }))
    }
}
