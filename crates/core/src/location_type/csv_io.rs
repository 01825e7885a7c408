//! Location type CSV import and export.

use crate::error::CsvError;
use crate::tabular::{self, RowViolation};

use super::types::{LocationTypeInput, LocationTypeNode, TypeImportReport, TypeRowOutcome};

const IMPORT_COLUMNS: &[&str] = &["name", "display_name", "parent_name"];
const EXPORT_COLUMNS: &[&str] = &[
    "location_type_id",
    "name",
    "display_name",
    "parent_name",
    "level",
];

/// Decoded type rows plus rows that failed to decode.
#[derive(Debug, Clone, Default)]
pub struct TypeCsvBatch {
    /// Decoded inputs with their file row numbers.
    pub inputs: Vec<(usize, LocationTypeInput)>,
    /// Rows that could not be decoded.
    pub violations: Vec<RowViolation>,
}

impl TypeCsvBatch {
    /// The decoded inputs without their row numbers.
    #[must_use]
    pub fn input_records(&self) -> Vec<LocationTypeInput> {
        self.inputs.iter().map(|(_, input)| input.clone()).collect()
    }

    /// Translates planner rejections back to file rows and merges them with
    /// the decode failures, ordered by row.
    #[must_use]
    pub fn violations_with(&self, report: &TypeImportReport) -> Vec<RowViolation> {
        let mut all = self.violations.clone();
        for row in &report.rows {
            if let TypeRowOutcome::Rejected { message } = &row.outcome
                && let Some((line, _)) = self.inputs.get(row.row_number.saturating_sub(1))
            {
                all.push(RowViolation::new(*line, message.clone()));
            }
        }
        all.sort_by_key(|v| v.line);
        all
    }
}

/// Parses a `name,display_name,parent_name` payload.
///
/// # Errors
///
/// Returns [`CsvError`] for an empty payload or a bad header.
pub fn parse_location_types(payload: &[u8]) -> Result<TypeCsvBatch, CsvError> {
    let mut batch = TypeCsvBatch::default();
    for (line, row) in tabular::read_rows(payload, IMPORT_COLUMNS)? {
        match row {
            Ok(fields) => {
                let [name, display_name, parent_name] = <[String; 3]>::try_from(fields)
                    .map_err(|_| CsvError::Malformed(format!("row {line} lost columns")))?;
                batch.inputs.push((
                    line,
                    LocationTypeInput::new(name, display_name, parent_name),
                ));
            }
            Err(violation) => batch.violations.push(violation),
        }
    }
    Ok(batch)
}

/// Writes types as a fully quoted CSV.
///
/// # Errors
///
/// Returns [`CsvError::Malformed`] if the writer fails.
pub fn export_location_types(types: &[LocationTypeNode]) -> Result<Vec<u8>, CsvError> {
    tabular::write_rows(
        EXPORT_COLUMNS,
        types.iter().map(|t| {
            vec![
                t.id.to_string(),
                t.name.clone(),
                t.display_name.clone(),
                t.parent_name.clone(),
                t.level.to_string(),
            ]
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use locus_shared::types::{LocationTypeId, PartitionKey};

    #[test]
    fn test_parse_location_types() {
        let payload = b"name,display_name,parent_name\n\
            brand,Brand,org\n\
            area,,brand\n\
            center,Center\n";

        let batch = parse_location_types(payload).unwrap();

        assert_eq!(batch.inputs.len(), 2);
        assert_eq!(batch.inputs[0], (2, LocationTypeInput::new("brand", "Brand", "org")));
        assert_eq!(batch.inputs[1].0, 3);
        assert_eq!(batch.inputs[1].1.display_name, "");
        assert_eq!(batch.violations.len(), 1);
        assert_eq!(batch.violations[0].line, 4);
    }

    #[test]
    fn test_rejections_map_back_to_file_rows() {
        let payload = b"name,display_name,parent_name\n\
            brand,Brand,org\n\
            broken\n\
            area,Area,ghost\n";
        let batch = parse_location_types(payload).unwrap();
        let report = TypeImportReport {
            rows: vec![
                crate::location_type::TypeRowReport {
                    row_number: 1,
                    name: "brand".into(),
                    outcome: TypeRowOutcome::Accepted {
                        type_id: LocationTypeId::new(),
                    },
                },
                crate::location_type::TypeRowReport {
                    row_number: 2,
                    name: "area".into(),
                    outcome: TypeRowOutcome::Rejected {
                        message: "location type ghost does not exist".into(),
                    },
                },
            ],
        };

        let violations = batch.violations_with(&report);

        assert_eq!(batch.input_records().len(), 2);
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].line, 3);
        assert_eq!(violations[1].line, 4);
        assert_eq!(violations[1].message, "location type ghost does not exist");
    }

    #[test]
    fn test_export_location_types() {
        let now = Utc::now();
        let id = LocationTypeId::new();
        let node = LocationTypeNode {
            id,
            partition: PartitionKey::new("p1").unwrap(),
            name: "brand".into(),
            display_name: "Brand".into(),
            parent_name: "org".into(),
            parent_type_id: None,
            level: 1,
            is_archived: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };

        let out = String::from_utf8(export_location_types(&[node]).unwrap()).unwrap();

        let mut lines = out.lines();
        assert_eq!(
            lines.next(),
            Some("\"location_type_id\",\"name\",\"display_name\",\"parent_name\",\"level\"")
        );
        assert_eq!(
            lines.next().map(str::to_string),
            Some(format!("\"{id}\",\"brand\",\"Brand\",\"org\",\"1\""))
        );
    }
}
