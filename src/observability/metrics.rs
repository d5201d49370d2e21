//! Metrics for the migration phases.
//!
//! Recording functions are grouped by phase and write through the `metrics`
//! facade; without an installed recorder they do nothing.

use crate::error::{MigrationError, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::fmt;
use tracing::info;

/// Enum representing all metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Pipeline metrics
    RowsIngested,
    RowsRejected,
    DuplicatesRemoved,
    BatchAccepted,

    // Loader metrics
    DocumentsInserted,
    InsertFailures,
    VerificationFindings,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::RowsIngested => "patient_migrator_rows_ingested_total",
            MetricName::RowsRejected => "patient_migrator_rows_rejected_total",
            MetricName::DuplicatesRemoved => "patient_migrator_duplicates_removed_total",
            MetricName::BatchAccepted => "patient_migrator_batch_accepted_total",

            MetricName::DocumentsInserted => "patient_migrator_documents_inserted_total",
            MetricName::InsertFailures => "patient_migrator_insert_failures_total",
            MetricName::VerificationFindings => "patient_migrator_verification_findings_total",
        }
    }

    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        use MetricName::*;
        [
            RowsIngested,
            RowsRejected,
            DuplicatesRemoved,
            BatchAccepted,
            DocumentsInserted,
            InsertFailures,
            VerificationFindings,
        ]
        .into_iter()
    }

    /// (phase, description)
    pub fn metadata(&self) -> (&'static str, &'static str) {
        match self {
            MetricName::RowsIngested => ("pipeline", "Rows read from the source file"),
            MetricName::RowsRejected => ("pipeline", "Rows rejected, by reason"),
            MetricName::DuplicatesRemoved => ("pipeline", "Exact duplicate rows removed"),
            MetricName::BatchAccepted => ("pipeline", "Records accepted into the load batch"),
            MetricName::DocumentsInserted => ("loader", "Documents committed to the store"),
            MetricName::InsertFailures => ("loader", "Bulk inserts that failed"),
            MetricName::VerificationFindings => ("loader", "Post-load verification findings, by kind"),
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Install the Prometheus recorder and return its handle for rendering
pub fn init() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| MigrationError::Config(format!("Failed to install Prometheus recorder: {}", e)))?;
    for metric in MetricName::all_metrics() {
        let (_, description) = metric.metadata();
        ::metrics::describe_counter!(metric.as_str(), description);
    }
    info!("Metrics system initialized");
    Ok(handle)
}

// ============================================================================
// Pipeline Metrics
// ============================================================================

pub mod pipeline {
    use super::MetricName;

    pub fn rows_ingested(count: usize) {
        ::metrics::counter!(MetricName::RowsIngested.as_str()).increment(count as u64);
    }

    /// Record one rejected row under its reason label
    pub fn row_rejected(reason: &str) {
        ::metrics::counter!(MetricName::RowsRejected.as_str(), "reason" => reason.to_string()).increment(1);
    }

    pub fn duplicates_removed(count: usize) {
        ::metrics::counter!(MetricName::DuplicatesRemoved.as_str()).increment(count as u64);
    }

    pub fn batch_accepted(count: usize) {
        ::metrics::counter!(MetricName::BatchAccepted.as_str()).increment(count as u64);
    }
}

// ============================================================================
// Loader Metrics
// ============================================================================

pub mod loader {
    use super::MetricName;

    pub fn documents_inserted(count: usize) {
        ::metrics::counter!(MetricName::DocumentsInserted.as_str()).increment(count as u64);
    }

    pub fn insert_failure() {
        ::metrics::counter!(MetricName::InsertFailures.as_str()).increment(1);
    }

    pub fn verification_finding(kind: &str) {
        ::metrics::counter!(MetricName::VerificationFindings.as_str(), "kind" => kind.to_string()).increment(1);
    }
}
