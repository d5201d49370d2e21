use super::clean::{parse_date, parse_decimal, parse_integer, row_fingerprint};
use super::ingest::{RawRow, RawTable};
use crate::constants::{AGE, BILLING_AMOUNT, DATE_OF_ADMISSION, DISCHARGE_DATE};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Pre-load integrity report over the ingested rows
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationSummary {
    pub total_rows: usize,
    /// Rows that exactly repeat an earlier row
    pub duplicate_count: usize,
    /// Rows whose discharge date is not after the admission date
    pub invalid_date_count: usize,
    /// Rows with a negative age or billing amount
    pub invalid_value_count: usize,
    /// Rows with a date or number that cannot be parsed
    pub unparsable_count: usize,
    /// Empty cells per column
    pub missing_values: BTreeMap<String, usize>,
}

impl ValidationSummary {
    /// No duplicates, bad dates, bad values or unparsable cells
    pub fn is_clean(&self) -> bool {
        self.duplicate_count == 0
            && self.invalid_date_count == 0
            && self.invalid_value_count == 0
            && self.unparsable_count == 0
    }

    pub fn total_missing_values(&self) -> usize {
        self.missing_values.values().sum()
    }
}

/// Count integrity problems without touching the table
pub fn validation_summary(table: &RawTable, date_formats: &[String]) -> ValidationSummary {
    let mut summary = ValidationSummary {
        total_rows: table.len(),
        missing_values: table.headers.iter().map(|h| (h.clone(), 0)).collect(),
        ..Default::default()
    };

    let mut seen = HashSet::new();
    for row in &table.rows {
        if !seen.insert(row_fingerprint(&row.values)) {
            summary.duplicate_count += 1;
        }

        for (header, value) in table.headers.iter().zip(&row.values) {
            if value.trim().is_empty() {
                if let Some(count) = summary.missing_values.get_mut(header) {
                    *count += 1;
                }
            }
        }

        let mut unparsable = false;

        let admission = cell(table, row, DATE_OF_ADMISSION).map(|v| parse_date(v, date_formats));
        let discharge = cell(table, row, DISCHARGE_DATE).map(|v| parse_date(v, date_formats));
        match (admission, discharge) {
            (Some(Some(admission)), Some(Some(discharge))) if discharge <= admission => {
                summary.invalid_date_count += 1;
            }
            (Some(None), _) | (_, Some(None)) => unparsable = true,
            _ => {}
        }

        let age = cell(table, row, AGE).map(parse_integer);
        let billing = cell(table, row, BILLING_AMOUNT).map(parse_decimal);
        if matches!(age, Some(Some(a)) if a < 0) || matches!(billing, Some(Some(b)) if b < 0.0) {
            summary.invalid_value_count += 1;
        }
        if matches!(age, Some(None)) || matches!(billing, Some(None)) {
            unparsable = true;
        }

        if unparsable {
            summary.unparsable_count += 1;
        }
    }

    summary
}

/// Non-empty cell text, if the column exists
fn cell<'a>(table: &RawTable, row: &'a RawRow, column: &str) -> Option<&'a str> {
    table.value(row, column).map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{DEFAULT_DATE_FORMATS, NAME};

    fn formats() -> Vec<String> {
        DEFAULT_DATE_FORMATS.iter().map(|f| f.to_string()).collect()
    }

    const HEADERS: [&str; 5] = [NAME, AGE, BILLING_AMOUNT, DATE_OF_ADMISSION, DISCHARGE_DATE];

    #[test]
    fn test_summary_counts_each_problem_kind() {
        let raw = RawTable::from_rows(
            &HEADERS,
            &[
                &["alice", "30", "10", "2024-01-01", "2024-01-03"],
                &["alice", "30", "10", "2024-01-01", "2024-01-03"],
                &["bob", "-1", "10", "2024-01-01", "2024-01-03"],
                &["carol", "40", "-5", "2024-01-05", "2024-01-01"],
                &["dave", "", "10", "soon", "2024-01-01"],
            ],
        );

        let summary = validation_summary(&raw, &formats());

        assert_eq!(summary.total_rows, 5);
        assert_eq!(summary.duplicate_count, 1);
        assert_eq!(summary.invalid_date_count, 1);
        assert_eq!(summary.invalid_value_count, 2);
        assert_eq!(summary.unparsable_count, 1);
        assert_eq!(summary.missing_values.get(AGE), Some(&1));
        assert_eq!(summary.missing_values.get(NAME), Some(&0));
        assert_eq!(summary.total_missing_values(), 1);
        assert!(!summary.is_clean());
    }

    #[test]
    fn test_fractional_age_is_unparsable_not_invalid() {
        let raw = RawTable::from_rows(
            &HEADERS,
            &[
                &["alice", "30.5", "10", "2024-01-01", "2024-01-03"],
                &["bob", "-0.5", "10", "2024-01-01", "2024-01-03"],
                &["carol", "41.0", "10", "2024-01-01", "2024-01-03"],
            ],
        );

        let summary = validation_summary(&raw, &formats());

        assert_eq!(summary.unparsable_count, 2);
        assert_eq!(summary.invalid_value_count, 0);
    }

    #[test]
    fn test_summary_does_not_mutate_input() {
        let raw = RawTable::from_rows(&HEADERS, &[&["ALICE", "30", "10", "2024-01-01", "2024-01-03"]]);
        let before = raw.clone();

        let summary = validation_summary(&raw, &formats());

        assert_eq!(raw, before);
        assert!(summary.is_clean());
    }
}
