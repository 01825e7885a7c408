//! CSV plumbing shared by the location and location type codecs.

use csv::{QuoteStyle, ReaderBuilder, Trim, WriterBuilder};
use serde::Serialize;

use crate::error::CsvError;

/// A problem with one CSV row. `line` counts the header as line 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowViolation {
    /// File row number.
    pub line: usize,
    /// Human-readable reason.
    pub message: String,
}

impl RowViolation {
    /// Creates a violation for `line`.
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }

    /// Field label in the form operators already know from the upload screen.
    #[must_use]
    pub fn field(&self) -> String {
        format!("Row Number: {}", self.line)
    }
}

impl std::fmt::Display for RowViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field(), self.message)
    }
}

/// One data row, decoded or rejected.
pub(crate) type DecodedRow = (usize, Result<Vec<String>, RowViolation>);

/// Reads `payload`, checks the header against `columns` (case-insensitive)
/// and decodes every data row.
pub(crate) fn read_rows(
    payload: &[u8],
    columns: &[&'static str],
) -> Result<Vec<DecodedRow>, CsvError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(payload);

    let mut records = reader.byte_records();
    let header = match records.next() {
        Some(record) => record?,
        None => return Err(CsvError::NoData),
    };
    if header.len() != columns.len() {
        return Err(CsvError::ColumnCount {
            expected: columns.len(),
            got: header.len(),
        });
    }
    for (idx, (got, expected)) in header.iter().zip(columns).enumerate() {
        let got = String::from_utf8_lossy(got).to_lowercase();
        if got != *expected {
            return Err(CsvError::HeaderMismatch {
                position: idx + 1,
                expected: *expected,
                got,
            });
        }
    }

    let mut rows = Vec::new();
    for (idx, record) in records.enumerate() {
        let line = idx + 2;
        let record = record?;
        if record.len() != columns.len() {
            rows.push((
                line,
                Err(RowViolation::new(
                    line,
                    format!(
                        "wrong number of columns, expected {}, got {}",
                        columns.len(),
                        record.len()
                    ),
                )),
            ));
            continue;
        }
        let decoded = record
            .iter()
            .zip(columns)
            .map(|(raw, column)| {
                String::from_utf8(raw.to_vec()).map_err(|_| {
                    RowViolation::new(line, format!("{column} is not a valid UTF8 string"))
                })
            })
            .collect();
        rows.push((line, decoded));
    }

    if rows.is_empty() {
        return Err(CsvError::NoData);
    }
    Ok(rows)
}

/// Writes `header` and `rows` with every field quoted.
pub(crate) fn write_rows<I, R>(header: &[&str], rows: I) -> Result<Vec<u8>, CsvError>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = String>,
{
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(Vec::new());
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| CsvError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLUMNS: &[&str] = &["name", "display_name"];

    #[test]
    fn test_read_rows_checks_header_case_insensitively() {
        let rows = read_rows(b"Name,DISPLAY_NAME\nbrand,Brand\n", COLUMNS).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, 2);
        assert_eq!(
            rows[0].1.as_ref().unwrap(),
            &vec!["brand".to_string(), "Brand".to_string()]
        );
    }

    #[test]
    fn test_read_rows_rejects_bad_header() {
        let err = read_rows(b"namez,display_name\nx,y\n", COLUMNS).unwrap_err();
        assert_eq!(
            err.to_string(),
            "csv has invalid format, column number 1 should be name, got namez"
        );

        let err = read_rows(b"name\nx\n", COLUMNS).unwrap_err();
        assert_eq!(err.to_string(), "wrong number of columns, expected 2, got 1");
    }

    #[test]
    fn test_read_rows_empty_payload() {
        assert_eq!(read_rows(b"", COLUMNS).unwrap_err(), CsvError::NoData);
        assert_eq!(
            read_rows(b"name,display_name\n", COLUMNS).unwrap_err(),
            CsvError::NoData
        );
    }

    #[test]
    fn test_read_rows_reports_invalid_utf8() {
        let mut payload = b"name,display_name\n".to_vec();
        payload.extend_from_slice(&[0xff, 0xfe, 0xfd]);
        payload.extend_from_slice(b",display\n");

        let rows = read_rows(&payload, COLUMNS).unwrap();
        let violation = rows[0].1.clone().unwrap_err();
        assert_eq!(violation.to_string(), "Row Number: 2: name is not a valid UTF8 string");
    }

    #[test]
    fn test_write_rows_quotes_everything() {
        let out = write_rows(&["a", "b"], vec![vec!["1".to_string(), "x".to_string()]]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "\"a\",\"b\"\n\"1\",\"x\"\n");
    }
}
