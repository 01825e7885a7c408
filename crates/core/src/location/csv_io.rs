//! Location CSV import and export.

use std::collections::HashMap;

use locus_shared::types::LocationTypeId;

use super::types::{ImportReport, LocationCandidate, LocationNode};
use crate::error::CsvError;
use crate::tabular::{self, RowViolation};

const IMPORT_COLUMNS: &[&str] = &[
    "partner_internal_id",
    "name",
    "location_type",
    "partner_internal_parent_id",
];
const EXPORT_COLUMNS: &[&str] = &[
    "location_id",
    "partner_internal_id",
    "name",
    "location_type",
    "partner_internal_parent_id",
];

/// Decoded candidates plus rows that failed to decode.
#[derive(Debug, Clone, Default)]
pub struct LocationCsvBatch {
    /// Candidates in file order.
    pub candidates: Vec<LocationCandidate>,
    /// File row number of each candidate.
    pub lines: Vec<usize>,
    /// Rows that could not be decoded.
    pub violations: Vec<RowViolation>,
}

impl LocationCsvBatch {
    /// Translates engine rejections back to file rows and merges them with
    /// the decode failures, ordered by row.
    #[must_use]
    pub fn violations_with(&self, report: &ImportReport) -> Vec<RowViolation> {
        let mut all = self.violations.clone();
        for (row, message) in report.rejections() {
            if let Some(&line) = self.lines.get(row.row_number.saturating_sub(1)) {
                all.push(RowViolation::new(line, message));
            }
        }
        all.sort_by_key(|v| v.line);
        all
    }
}

/// Parses a location import payload.
///
/// # Errors
///
/// Returns [`CsvError`] for an empty payload or a bad header.
pub fn parse_locations(payload: &[u8]) -> Result<LocationCsvBatch, CsvError> {
    let mut batch = LocationCsvBatch::default();
    for (line, row) in tabular::read_rows(payload, IMPORT_COLUMNS)? {
        match row {
            Ok(fields) => {
                let [partner_id, name, type_name, parent_id] = <[String; 4]>::try_from(fields)
                    .map_err(|_| CsvError::Malformed(format!("row {line} lost columns")))?;
                batch
                    .candidates
                    .push(LocationCandidate::new(partner_id, name, type_name, parent_id));
                batch.lines.push(line);
            }
            Err(violation) => batch.violations.push(violation),
        }
    }
    Ok(batch)
}

/// Writes locations as a fully quoted CSV. `type_names` resolves type ids;
/// unknown types are written empty.
///
/// # Errors
///
/// Returns [`CsvError::Malformed`] if the writer fails.
pub fn export_locations(
    nodes: &[LocationNode],
    type_names: &HashMap<LocationTypeId, String>,
) -> Result<Vec<u8>, CsvError> {
    tabular::write_rows(
        EXPORT_COLUMNS,
        nodes.iter().map(|n| {
            vec![
                n.id.to_string(),
                n.partner_external_id.clone(),
                n.name.clone(),
                type_names.get(&n.type_id).cloned().unwrap_or_default(),
                n.partner_external_parent_id.clone(),
            ]
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::types::{AccessPath, RowOutcome, RowReport};
    use chrono::Utc;
    use locus_shared::types::{LocationId, PartitionKey};

    #[test]
    fn test_parse_locations() {
        let payload = b"Partner_Internal_ID,Name,Location_Type,Partner_Internal_Parent_ID\n\
            b1,Brand 1,brand,\n\
            c1,Center 1,center,b1\n";

        let batch = parse_locations(payload).unwrap();

        assert_eq!(
            batch.candidates,
            vec![
                LocationCandidate::new("b1", "Brand 1", "brand", ""),
                LocationCandidate::new("c1", "Center 1", "center", "b1"),
            ]
        );
        assert_eq!(batch.lines, vec![2, 3]);
        assert!(batch.violations.is_empty());
    }

    #[test]
    fn test_violations_map_back_to_file_rows() {
        let mut payload =
            b"partner_internal_id,name,location_type,partner_internal_parent_id\n".to_vec();
        payload.extend_from_slice(b"b1,Brand 1,brand,\n");
        payload.extend_from_slice(b"b2,");
        payload.extend_from_slice(&[0xff, 0xfe]);
        payload.extend_from_slice(b",brand,\n");
        payload.extend_from_slice(b"b1,Brand 1 again,brand,\n");

        let batch = parse_locations(&payload).unwrap();
        assert_eq!(batch.lines, vec![2, 4]);

        let report = ImportReport {
            rows: vec![
                RowReport {
                    row_number: 1,
                    partner_id: "b1".into(),
                    outcome: RowOutcome::Accepted {
                        location_id: LocationId::new(),
                        persisted: false,
                    },
                },
                RowReport {
                    row_number: 2,
                    partner_id: "b1".into(),
                    outcome: RowOutcome::Rejected {
                        message: "partner internal id b1 is duplicated".into(),
                    },
                },
            ],
        };

        let violations: Vec<String> = batch
            .violations_with(&report)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            violations,
            vec![
                "Row Number: 3: name is not a valid UTF8 string",
                "Row Number: 4: partner internal id b1 is duplicated",
            ]
        );
    }

    #[test]
    fn test_export_locations() {
        let now = Utc::now();
        let id = LocationId::new();
        let type_id = LocationTypeId::new();
        let node = LocationNode {
            id,
            partition: PartitionKey::new("p1").unwrap(),
            name: "Center, North".into(),
            type_id,
            parent_id: None,
            partner_external_id: "c1".into(),
            partner_external_parent_id: "b1".into(),
            access_path: AccessPath::root(id),
            is_archived: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        let names = HashMap::from([(type_id, "center".to_string())]);

        let out = String::from_utf8(export_locations(&[node], &names).unwrap()).unwrap();

        assert_eq!(
            out,
            format!(
                "\"location_id\",\"partner_internal_id\",\"name\",\"location_type\",\"partner_internal_parent_id\"\n\
                 \"{id}\",\"c1\",\"Center, North\",\"center\",\"b1\"\n"
            )
        );
    }
}
