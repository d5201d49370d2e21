// Record pipeline: ingest, clean, validate

pub mod clean;
pub mod ingest;
pub mod record;
pub mod summary;
pub mod validate;

pub use clean::{clean_table, title_case, CleanOutcome};
pub use ingest::{ingest, ingest_reader, RawRow, RawTable};
pub use record::{FieldValue, Record, Row, Table};
pub use summary::{validation_summary, ValidationSummary};
pub use validate::{check_record, validate_rows, Batch, RejectReason, RejectedRow, Validation, ValidationStats};

use crate::constants::DEFAULT_DATE_FORMATS;
use crate::error::{MigrationError, Result};
use crate::observability::metrics;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, instrument, warn};

/// How the pipeline treats rows that break an integrity rule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Abort the run on the first duplicate, unparsable value or invalid row
    Strict,
    /// Drop offending rows and report them
    #[default]
    Lenient,
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationMode::Strict => f.write_str("strict"),
            ValidationMode::Lenient => f.write_str("lenient"),
        }
    }
}

impl FromStr for ValidationMode {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(ValidationMode::Strict),
            "lenient" => Ok(ValidationMode::Lenient),
            other => Err(MigrationError::Config(format!(
                "unknown validation mode '{other}' (expected 'strict' or 'lenient')"
            ))),
        }
    }
}

/// Settings for a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub mode: ValidationMode,
    /// chrono formats tried in order when parsing date columns
    pub date_formats: Vec<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            mode: ValidationMode::default(),
            date_formats: DEFAULT_DATE_FORMATS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// Everything a pipeline run produced
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub summary: ValidationSummary,
    /// Accepted and rejected counts over the deduplicated rows
    pub stats: ValidationStats,
    pub batch: Batch,
    /// Unparsable rows followed by rows failing a record invariant
    pub rejected: Vec<RejectedRow>,
    pub duplicates_removed: usize,
}

impl PipelineOutcome {
    /// Every input row is in the batch, rejected, or removed as a duplicate
    pub fn accounted_rows(&self) -> usize {
        self.batch.len() + self.rejected.len() + self.duplicates_removed
    }
}

pub struct Pipeline {
    settings: PipelineSettings,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PipelineSettings::default())
    }
}

impl Pipeline {
    pub fn new(settings: PipelineSettings) -> Self {
        Self { settings }
    }

    /// Default settings with the given mode
    pub fn with_mode(mode: ValidationMode) -> Self {
        Self::new(PipelineSettings {
            mode,
            ..PipelineSettings::default()
        })
    }

    pub fn mode(&self) -> ValidationMode {
        self.settings.mode
    }

    pub fn ingest(&self, source: &Path) -> Result<RawTable> {
        let table = ingest::ingest(source)?;
        metrics::pipeline::rows_ingested(table.len());
        Ok(table)
    }

    pub fn validation_summary(&self, table: &RawTable) -> ValidationSummary {
        summary::validation_summary(table, &self.settings.date_formats)
    }

    /// Clean the table. Strict mode fails on the first unparsable value.
    pub fn clean(&self, table: &RawTable) -> Result<CleanOutcome> {
        let outcome = clean::clean_table(table, &self.settings.date_formats);
        metrics::pipeline::duplicates_removed(outcome.duplicates_removed);

        if self.settings.mode == ValidationMode::Strict {
            if let Some(first) = outcome.unparsable.first() {
                if let RejectReason::Unparsable { column, value } = &first.reason {
                    return Err(MigrationError::Parse {
                        line: first.line,
                        column: column.clone(),
                        value: value.clone(),
                    });
                }
            }
        }
        Ok(outcome)
    }

    /// Validate cleaned rows. Strict mode fails if any row is rejected or
    /// cleaning removed duplicates.
    pub fn validate(&self, table: Table, duplicates_removed: usize) -> Result<Validation> {
        let validation = validate::validate_rows(table.rows);
        for rejected in &validation.rejected {
            metrics::pipeline::row_rejected(rejected.reason.label());
        }

        if self.settings.mode == ValidationMode::Strict
            && (duplicates_removed > 0 || !validation.rejected.is_empty())
        {
            let first_problem = validation
                .rejected
                .first()
                .map(|r| format!("line {}: {}", r.line, r.reason))
                .unwrap_or_else(|| format!("{} exact duplicate row(s)", duplicates_removed));
            return Err(MigrationError::Integrity {
                rejected: validation.rejected.len(),
                duplicates: duplicates_removed,
                first_problem,
            });
        }
        Ok(validation)
    }

    /// Ingest a file and carry it through every stage
    #[instrument(skip(self), fields(mode = %self.settings.mode))]
    pub fn run(&self, source: &Path) -> Result<PipelineOutcome> {
        let raw = self.ingest(source)?;
        self.run_table(&raw)
    }

    /// Carry an already ingested table through summary, clean and validate
    pub fn run_table(&self, raw: &RawTable) -> Result<PipelineOutcome> {
        let summary = self.validation_summary(raw);
        info!(
            "Integrity report: {} duplicate(s), {} invalid date(s), {} invalid value(s), {} unparsable, {} missing value(s)",
            summary.duplicate_count,
            summary.invalid_date_count,
            summary.invalid_value_count,
            summary.unparsable_count,
            summary.total_missing_values()
        );

        let cleaned = self.clean(raw)?;
        for rejected in &cleaned.unparsable {
            metrics::pipeline::row_rejected(rejected.reason.label());
        }
        let validation = self.validate(cleaned.table, cleaned.duplicates_removed)?;
        metrics::pipeline::batch_accepted(validation.accepted.len());

        let mut rejected = cleaned.unparsable;
        rejected.extend(validation.rejected);
        if !rejected.is_empty() {
            warn!("{} row(s) rejected and left out of the batch", rejected.len());
        }

        let validation = Validation {
            accepted: validation.accepted,
            rejected,
        };
        let stats = validation.stats();
        info!(
            "Accepted {} of {} row(s), rejection rate {:.1}%",
            stats.accepted_count,
            stats.total_rows,
            stats.rejection_rate()
        );

        Ok(PipelineOutcome {
            summary,
            stats,
            batch: validation.accepted,
            rejected: validation.rejected,
            duplicates_removed: cleaned.duplicates_removed,
        })
    }
}
