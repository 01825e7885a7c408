//! Location node types and batch import records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use locus_shared::types::{LocationId, LocationTypeId, PartitionKey};

use crate::error::ValidationError;

/// Separator used when an access path is stored as text.
pub const ACCESS_PATH_SEPARATOR: char = '/';

/// Materialized ancestor path, ordered root..self.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct AccessPath(Vec<LocationId>);

impl AccessPath {
    /// Path of a root node.
    #[must_use]
    pub fn root(id: LocationId) -> Self {
        Self(vec![id])
    }

    /// Path of a child of the node owning `self`.
    #[must_use]
    pub fn child(&self, id: LocationId) -> Self {
        let mut ids = Vec::with_capacity(self.0.len() + 1);
        ids.extend_from_slice(&self.0);
        ids.push(id);
        Self(ids)
    }

    /// Ancestor ids including self.
    #[must_use]
    pub fn ids(&self) -> &[LocationId] {
        &self.0
    }

    /// The node owning this path.
    #[must_use]
    pub fn last(&self) -> Option<LocationId> {
        self.0.last().copied()
    }

    /// Number of nodes on the path.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for a path with no ids (never produced by the catalog).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if `id` is on this path (self included).
    #[must_use]
    pub fn contains(&self, id: LocationId) -> bool {
        self.0.contains(&id)
    }

    /// True if `prefix` is an ancestor-or-self path of this one.
    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl std::fmt::Display for AccessPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{ACCESS_PATH_SEPARATOR}")?;
            }
            write!(f, "{id}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for AccessPath {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(ACCESS_PATH_SEPARATOR)
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl From<AccessPath> for String {
    fn from(path: AccessPath) -> Self {
        path.to_string()
    }
}

impl TryFrom<String> for AccessPath {
    type Error = uuid::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A persisted location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationNode {
    /// Internal identifier.
    pub id: LocationId,
    /// Owning partition.
    pub partition: PartitionKey,
    /// Display name.
    pub name: String,
    /// Location type.
    pub type_id: LocationTypeId,
    /// Adjacency pointer; `None` only for the partition root.
    pub parent_id: Option<LocationId>,
    /// External key used to deduplicate across imports.
    pub partner_external_id: String,
    /// External parent key as last imported.
    pub partner_external_parent_id: String,
    /// Materialized ancestor path.
    pub access_path: AccessPath,
    /// Soft visibility flag, independent of deletion.
    pub is_archived: bool,
    /// Tombstone.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl LocationNode {
    /// True if the node carries its own tombstone.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Checks `updated_at >= created_at`.
    pub fn validate_timestamps(&self) -> Result<(), ValidationError> {
        if self.updated_at < self.created_at {
            return Err(ValidationError::TimestampOrder);
        }
        Ok(())
    }
}

/// One externally-sourced record of an import batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationCandidate {
    /// Display name.
    pub name: String,
    /// Location type name.
    pub type_name: String,
    /// External key.
    pub partner_id: String,
    /// External parent key; empty means the partition root.
    pub partner_parent_id: String,
}

impl LocationCandidate {
    /// Convenience constructor used heavily by tests and the CSV reader.
    #[must_use]
    pub fn new(
        partner_id: impl Into<String>,
        name: impl Into<String>,
        type_name: impl Into<String>,
        partner_parent_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            partner_id: partner_id.into(),
            partner_parent_id: partner_parent_id.into(),
        }
    }
}

/// A candidate resolved to an internal node, ready for upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation {
    /// Node to write. Its `access_path` is provisional.
    pub node: LocationNode,
    /// True if a row with this id already exists.
    pub persisted: bool,
}

/// Whether lookups should see tombstoned rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tombstones {
    /// Only rows without `deleted_at`.
    #[default]
    Exclude,
    /// All rows.
    Include,
}

impl Tombstones {
    /// True if a row with the given tombstone passes this policy.
    #[must_use]
    pub const fn admits(self, deleted_at: Option<&DateTime<Utc>>) -> bool {
        matches!(self, Self::Include) || deleted_at.is_none()
    }
}

/// Adjacency entry loaded for a path recompute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEdge {
    /// Node id.
    pub id: LocationId,
    /// Parent pointer.
    pub parent_id: Option<LocationId>,
    /// Path currently stored for the node.
    pub access_path: AccessPath,
}

/// Outcome of one input row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowOutcome {
    /// Row written.
    Accepted {
        /// Node id assigned or reused.
        location_id: LocationId,
        /// True if the row matched an existing node.
        persisted: bool,
    },
    /// Row rejected.
    Rejected {
        /// Human-readable reason.
        message: String,
    },
}

/// Per-row report for one row of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowReport {
    /// 1-based data row number (header excluded).
    pub row_number: usize,
    /// External key of the row, as supplied.
    pub partner_id: String,
    /// Outcome.
    #[serde(flatten)]
    pub outcome: RowOutcome,
}

/// Per-row report for a whole batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// One entry per input row, in input order.
    pub rows: Vec<RowReport>,
}

impl ImportReport {
    /// Number of accepted rows.
    #[must_use]
    pub fn accepted_count(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| matches!(r.outcome, RowOutcome::Accepted { .. }))
            .count()
    }

    /// Rejected rows with their messages.
    pub fn rejections(&self) -> impl Iterator<Item = (&RowReport, &str)> {
        self.rows.iter().filter_map(|r| match &r.outcome {
            RowOutcome::Rejected { message } => Some((r, message.as_str())),
            RowOutcome::Accepted { .. } => None,
        })
    }

    /// True if every row was accepted.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.rejections().next().is_none()
    }
}

/// Filter for visibility-aware listing.
#[derive(Debug, Clone, Default)]
pub struct VisibilityFilter {
    /// Keep archived nodes.
    pub include_archived: bool,
    /// Restrict to these types.
    pub type_ids: Option<Vec<LocationTypeId>>,
    /// Case-insensitive substring of the name.
    pub name_contains: Option<String>,
}

impl VisibilityFilter {
    /// True if `node` passes the filter's own predicates.
    #[must_use]
    pub fn matches(&self, node: &LocationNode) -> bool {
        if !self.include_archived && node.is_archived {
            return false;
        }
        if let Some(type_ids) = &self.type_ids
            && !type_ids.contains(&node.type_id)
        {
            return false;
        }
        if let Some(needle) = &self.name_contains
            && !node.name.to_lowercase().contains(&needle.to_lowercase())
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn named(name: &str, is_archived: bool) -> LocationNode {
        let id = LocationId::new();
        let now = Utc::now();
        LocationNode {
            id,
            partition: PartitionKey::new("p1").unwrap(),
            name: name.to_string(),
            type_id: LocationTypeId::new(),
            parent_id: None,
            partner_external_id: String::new(),
            partner_external_parent_id: String::new(),
            access_path: AccessPath::root(id),
            is_archived,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[rstest]
    #[case(None, false, false, true)]
    #[case(None, true, false, false)]
    #[case(None, true, true, true)]
    #[case(Some("NORTH"), false, false, true)]
    #[case(Some("south"), false, false, false)]
    fn test_visibility_filter_matches(
        #[case] needle: Option<&str>,
        #[case] archived: bool,
        #[case] include_archived: bool,
        #[case] expected: bool,
    ) {
        let filter = VisibilityFilter {
            include_archived,
            type_ids: None,
            name_contains: needle.map(str::to_string),
        };
        assert_eq!(filter.matches(&named("Center North", archived)), expected);
    }

    #[test]
    fn test_visibility_filter_restricts_types() {
        let node = named("Brand", false);
        let filter = VisibilityFilter {
            type_ids: Some(vec![LocationTypeId::new()]),
            ..VisibilityFilter::default()
        };
        assert!(!filter.matches(&node));
    }

    #[test]
    fn test_access_path_text_roundtrip() {
        let root = LocationId::new();
        let child = LocationId::new();
        let path = AccessPath::root(root).child(child);

        let text = path.to_string();
        assert_eq!(text, format!("{root}/{child}"));
        assert_eq!(text.parse::<AccessPath>().unwrap(), path);
    }

    #[test]
    fn test_access_path_prefix() {
        let root = AccessPath::root(LocationId::new());
        let child = root.child(LocationId::new());
        let grandchild = child.child(LocationId::new());

        assert!(grandchild.starts_with(&root));
        assert!(grandchild.starts_with(&child));
        assert!(!child.starts_with(&grandchild));
        assert_eq!(grandchild.len(), 3);
    }

    #[test]
    fn test_access_path_rejects_bad_segment() {
        assert!("abc/def".parse::<AccessPath>().is_err());
    }

    #[test]
    fn test_tombstone_policy() {
        let now = Utc::now();
        assert!(Tombstones::Exclude.admits(None));
        assert!(!Tombstones::Exclude.admits(Some(&now)));
        assert!(Tombstones::Include.admits(Some(&now)));
    }

    #[test]
    fn test_row_report_serializes_flat() {
        let report = RowReport {
            row_number: 3,
            partner_id: "c1".into(),
            outcome: RowOutcome::Rejected {
                message: "missing parent location b9".into(),
            },
        };

        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "row_number": 3,
                "partner_id": "c1",
                "status": "rejected",
                "message": "missing parent location b9",
            })
        );
    }

    #[test]
    fn test_access_path_serializes_as_text() {
        let id = LocationId::new();
        let json = serde_json::to_string(&AccessPath::root(id)).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }
}
