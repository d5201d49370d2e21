use super::record::{FieldValue, Record, Row};
use crate::constants::{AGE, BILLING_AMOUNT, DATE_OF_ADMISSION, DISCHARGE_DATE};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

/// Why a row was kept out of the batch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    /// Discharge is not strictly after admission
    InvalidDates {
        admission: NaiveDate,
        discharge: NaiveDate,
    },
    InvalidAge { age: f64 },
    InvalidBilling { amount: f64 },
    MissingField { field: String },
    Unparsable { column: String, value: String },
}

impl RejectReason {
    /// Short machine label, used for metric labels and grouping
    pub fn label(&self) -> &'static str {
        match self {
            RejectReason::InvalidDates { .. } => "invalid_dates",
            RejectReason::InvalidAge { .. } => "invalid_age",
            RejectReason::InvalidBilling { .. } => "invalid_billing_amount",
            RejectReason::MissingField { .. } => "missing_field",
            RejectReason::Unparsable { .. } => "unparsable_value",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::InvalidDates { .. } => f.write_str("invalid dates"),
            RejectReason::InvalidAge { .. } => f.write_str("invalid age"),
            RejectReason::InvalidBilling { .. } => f.write_str("invalid billing amount"),
            RejectReason::MissingField { field } => write!(f, "missing field {}", field),
            RejectReason::Unparsable { column, value } => {
                write!(f, "unparsable value in column '{}': '{}'", column, value)
            }
        }
    }
}

/// A row that did not make it into the batch, with the first failing reason
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedRow {
    pub line: u64,
    pub record: Record,
    pub reason: RejectReason,
}

/// Records accepted for loading, in input order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    rows: Vec<Row>,
}

impl Batch {
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    /// Batch built directly from records, numbered as if read after a header line
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let rows = records
            .into_iter()
            .zip(2u64..)
            .map(|(record, line)| Row { line, record })
            .collect();
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.rows.iter().map(|row| &row.record)
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

/// Outcome of validating a set of rows: every row lands in exactly one side
#[derive(Debug, Clone, Default)]
pub struct Validation {
    pub accepted: Batch,
    pub rejected: Vec<RejectedRow>,
}

impl Validation {
    pub fn stats(&self) -> ValidationStats {
        let mut by_reason = BTreeMap::new();
        for rejected in &self.rejected {
            *by_reason.entry(rejected.reason.label().to_string()).or_insert(0) += 1;
        }
        ValidationStats {
            total_rows: self.accepted.len() + self.rejected.len(),
            accepted_count: self.accepted.len(),
            rejected_count: self.rejected.len(),
            rejected_by_reason: by_reason,
        }
    }
}

/// Counts for a validation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationStats {
    pub total_rows: usize,
    pub accepted_count: usize,
    pub rejected_count: usize,
    pub rejected_by_reason: BTreeMap<String, usize>,
}

impl ValidationStats {
    /// Rejected rows as a percentage of all rows
    pub fn rejection_rate(&self) -> f64 {
        if self.total_rows == 0 {
            return 0.0;
        }
        self.rejected_count as f64 / self.total_rows as f64 * 100.0
    }
}

type Check = fn(&Record) -> Result<(), RejectReason>;

/// Applied in this order; the first failure is the reported reason
const CHECKS: [Check; 3] = [check_dates, check_age, check_billing];

/// Run the record invariants against one record
pub fn check_record(record: &Record) -> Result<(), RejectReason> {
    CHECKS.iter().try_for_each(|check| check(record))
}

/// Split rows into accepted and rejected
pub fn validate_rows(rows: Vec<Row>) -> Validation {
    let mut validation = Validation::default();

    for row in rows {
        match check_record(&row.record) {
            Ok(()) => validation.accepted.rows.push(row),
            Err(reason) => {
                warn!("Rejecting row on line {}: {}", row.line, reason);
                validation.rejected.push(RejectedRow {
                    line: row.line,
                    record: row.record,
                    reason,
                });
            }
        }
    }

    info!(
        "Validated {} row(s): {} accepted, {} rejected",
        validation.accepted.len() + validation.rejected.len(),
        validation.accepted.len(),
        validation.rejected.len()
    );
    validation
}

fn check_dates(record: &Record) -> Result<(), RejectReason> {
    let admission = required_date(record, DATE_OF_ADMISSION)?;
    let discharge = required_date(record, DISCHARGE_DATE)?;
    if discharge <= admission {
        return Err(RejectReason::InvalidDates {
            admission,
            discharge,
        });
    }
    Ok(())
}

fn check_age(record: &Record) -> Result<(), RejectReason> {
    let age = required_number(record, AGE)?;
    if age < 0.0 {
        return Err(RejectReason::InvalidAge { age });
    }
    Ok(())
}

fn check_billing(record: &Record) -> Result<(), RejectReason> {
    let amount = required_number(record, BILLING_AMOUNT)?;
    if amount < 0.0 {
        return Err(RejectReason::InvalidBilling { amount });
    }
    Ok(())
}

fn required_date(record: &Record, field: &str) -> Result<NaiveDate, RejectReason> {
    let value = required(record, field)?;
    value.as_date().ok_or_else(|| unparsable(field, value))
}

fn required_number(record: &Record, field: &str) -> Result<f64, RejectReason> {
    let value = required(record, field)?;
    value.as_f64().ok_or_else(|| unparsable(field, value))
}

fn required<'a>(record: &'a Record, field: &str) -> Result<&'a FieldValue, RejectReason> {
    record
        .get(field)
        .filter(|v| !v.is_null())
        .ok_or_else(|| RejectReason::MissingField {
            field: field.to_string(),
        })
}

fn unparsable(field: &str, value: &FieldValue) -> RejectReason {
    RejectReason::Unparsable {
        column: field.to_string(),
        value: value.to_string(),
    }
}
