use super::ingest::{RawRow, RawTable};
use super::record::{FieldValue, Record, Row, Table};
use super::validate::{RejectReason, RejectedRow};
use crate::constants::{AGE, BILLING_AMOUNT, DATE_COLUMNS, NAME};
use chrono::{NaiveDate, NaiveDateTime};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::{debug, info};

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Result of cleaning a raw table
#[derive(Debug, Clone)]
pub struct CleanOutcome {
    pub table: Table,
    pub duplicates_removed: usize,
    /// Rows dropped because a date or number could not be parsed
    pub unparsable: Vec<RejectedRow>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ColumnKind {
    Integer,
    Decimal,
    Text,
}

/// Drop exact duplicates, type every cell and title-case names.
///
/// Duplicates are judged on the raw cell text and the first occurrence wins.
/// The remaining rows keep their input order and every record keeps one
/// entry per header column.
pub fn clean_table(raw: &RawTable, date_formats: &[String]) -> CleanOutcome {
    let mut seen = HashSet::new();
    let unique: Vec<&RawRow> = raw
        .rows
        .iter()
        .filter(|row| seen.insert(row_fingerprint(&row.values)))
        .collect();
    let duplicates_removed = raw.rows.len() - unique.len();

    let kinds: Vec<ColumnKind> = raw
        .headers
        .iter()
        .enumerate()
        .map(|(idx, header)| {
            let column = unique
                .iter()
                .map(|row| row.values.get(idx).map(String::as_str).unwrap_or_default());
            infer_column_kind(header, column)
        })
        .collect();

    let mut rows = Vec::with_capacity(unique.len());
    let mut unparsable = Vec::new();

    for raw_row in unique {
        let mut record = Record::new();
        let mut failure = None;

        for ((header, value), kind) in raw.headers.iter().zip(&raw_row.values).zip(&kinds) {
            match parse_cell(header, value, *kind, date_formats) {
                Ok(parsed) => record.set(header, parsed),
                Err(reason) => {
                    record.set(header, value.as_str());
                    failure.get_or_insert(reason);
                }
            }
        }

        match failure {
            Some(reason) => {
                debug!("Row on line {} is unparsable: {}", raw_row.line, reason);
                unparsable.push(RejectedRow {
                    line: raw_row.line,
                    record,
                    reason,
                });
            }
            None => rows.push(Row {
                line: raw_row.line,
                record,
            }),
        }
    }

    info!(
        "Cleaned {} row(s): {} duplicate(s) removed, {} unparsable",
        raw.rows.len(),
        duplicates_removed,
        unparsable.len()
    );

    CleanOutcome {
        table: Table {
            headers: raw.headers.clone(),
            rows,
        },
        duplicates_removed,
        unparsable,
    }
}

fn parse_cell(
    header: &str,
    value: &str,
    kind: ColumnKind,
    date_formats: &[String],
) -> std::result::Result<FieldValue, RejectReason> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(FieldValue::Null);
    }

    let unparsable = || RejectReason::Unparsable {
        column: header.to_string(),
        value: value.to_string(),
    };

    if DATE_COLUMNS.contains(&header) {
        return parse_date(trimmed, date_formats).map(FieldValue::Date).ok_or_else(unparsable);
    }

    match header {
        NAME => Ok(FieldValue::Text(title_case(value))),
        AGE => parse_integer(trimmed).map(FieldValue::Integer).ok_or_else(unparsable),
        BILLING_AMOUNT => parse_decimal(trimmed).map(FieldValue::Decimal).ok_or_else(unparsable),
        _ => Ok(match kind {
            ColumnKind::Integer => parse_integer(trimmed).map(FieldValue::Integer),
            ColumnKind::Decimal => parse_decimal(trimmed).map(FieldValue::Decimal),
            ColumnKind::Text => None,
        }
        .unwrap_or_else(|| FieldValue::Text(value.to_string()))),
    }
}

fn infer_column_kind<'a>(header: &str, values: impl Iterator<Item = &'a str>) -> ColumnKind {
    if header == NAME {
        return ColumnKind::Text;
    }

    let mut kind = ColumnKind::Integer;
    for value in values.map(str::trim).filter(|v| !v.is_empty()) {
        if kind == ColumnKind::Integer && value.parse::<i64>().is_err() {
            kind = ColumnKind::Decimal;
        }
        if kind == ColumnKind::Decimal && parse_decimal(value).is_none() {
            return ColumnKind::Text;
        }
    }
    kind
}

/// Upper-case a letter when the previous character is not a letter,
/// lower-case it otherwise
pub fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut previous_is_letter = false;
    for c in value.chars() {
        if c.is_alphabetic() {
            if previous_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            previous_is_letter = true;
        } else {
            out.push(c);
            previous_is_letter = false;
        }
    }
    out
}

/// Parse a calendar date with multiple format attempts; date-times are truncated
pub fn parse_date(value: &str, date_formats: &[String]) -> Option<NaiveDate> {
    let value = value.trim();
    for format in date_formats {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date);
        }
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|datetime| datetime.date())
}

/// Whole numbers, also accepting a zero fraction such as "42.0"
pub fn parse_integer(value: &str) -> Option<i64> {
    let value = value.trim();
    value.parse::<i64>().ok().or_else(|| {
        parse_decimal(value)
            .filter(|d| d.fract() == 0.0 && d.abs() < i64::MAX as f64)
            .map(|d| d as i64)
    })
}

pub fn parse_decimal(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|d| d.is_finite())
}

/// Stable fingerprint of a row's raw cells, used for exact-duplicate detection
pub fn row_fingerprint(values: &[String]) -> String {
    let mut hasher = Sha256::new();
    for value in values {
        hasher.update(value.as_bytes());
        hasher.update([0x1f]);
    }
    hex::encode(hasher.finalize())
}
