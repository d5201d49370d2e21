use crate::error::{MigrationError, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, instrument};

/// One input row as read from the source, before any typing
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// 1-based line in the source file
    pub line: u64,
    pub values: Vec<String>,
}

/// Header plus raw rows of a delimited file
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    /// Build a table from literal rows; line numbers start after the header
    pub fn from_rows(headers: &[&str], rows: &[&[&str]]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .enumerate()
                .map(|(i, values)| RawRow {
                    line: i as u64 + 2,
                    values: values.iter().map(|v| v.to_string()).collect(),
                })
                .collect(),
        }
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == column)
    }

    pub fn value<'a>(&self, row: &'a RawRow, column: &str) -> Option<&'a str> {
        self.column_index(column)
            .and_then(|idx| row.values.get(idx))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Read a delimited file with a header row into memory
#[instrument]
pub fn ingest(path: &Path) -> Result<RawTable> {
    let source_name = path.display().to_string();
    let file = File::open(path).map_err(|e| MigrationError::Ingest {
        source_path: source_name.clone(),
        message: format!("cannot open file: {e}"),
    })?;
    let table = ingest_reader(file, &source_name)?;
    info!("Ingested {} row(s) with {} column(s) from {}", table.len(), table.headers.len(), source_name);
    Ok(table)
}

/// Same as [`ingest`] over any reader; `source_name` only labels errors
pub fn ingest_reader<R: Read>(reader: R, source_name: &str) -> Result<RawTable> {
    let ingest_error = |message: String| MigrationError::Ingest {
        source_path: source_name.to_string(),
        message,
    };

    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()
        .map_err(|e| ingest_error(format!("unreadable header row: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();

    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(ingest_error("missing header row".to_string()));
    }

    let mut rows = Vec::new();
    for result in csv_reader.records() {
        let record = result.map_err(|e| ingest_error(format!("malformed row: {e}")))?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        rows.push(RawRow {
            line,
            values: record.iter().map(str::to_string).collect(),
        });
    }

    debug!("Read {} raw row(s) from {}", rows.len(), source_name);
    Ok(RawTable { headers, rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_reader_reads_header_and_rows() {
        let data = "Name,Age\nbob smith,30\nALICE,41\n";
        let table = ingest_reader(data.as_bytes(), "inline").unwrap();

        assert_eq!(table.headers, vec!["Name", "Age"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0].line, 2);
        assert_eq!(table.value(&table.rows[1], "Name"), Some("ALICE"));
        assert_eq!(table.value(&table.rows[1], "Missing"), None);
    }

    #[test]
    fn test_ingest_reader_rejects_wrong_column_count() {
        let data = "Name,Age\nbob,30\ncarol\n";
        let err = ingest_reader(data.as_bytes(), "inline").unwrap_err();
        assert!(matches!(err, MigrationError::Ingest { .. }));
    }

    #[test]
    fn test_ingest_reader_rejects_empty_input() {
        let err = ingest_reader("".as_bytes(), "empty.csv").unwrap_err();
        match err {
            MigrationError::Ingest { source_path, message } => {
                assert_eq!(source_path, "empty.csv");
                assert!(message.contains("header"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_ingest_missing_file_is_ingest_error() {
        let err = ingest(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, MigrationError::Ingest { .. }));
    }

    #[test]
    fn test_quoted_fields_keep_delimiters() {
        let data = "Name,Doctor\n\"smith, bob\",\"Lee, Sarah\"\n";
        let table = ingest_reader(data.as_bytes(), "inline").unwrap();
        assert_eq!(table.rows[0].values, vec!["smith, bob", "Lee, Sarah"]);
    }
}
