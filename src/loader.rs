//! Loader: bulk insert, post-load verification and CRUD over one collection.

use crate::constants::{AGE, BILLING_AMOUNT, DATE_OF_ADMISSION, DEFAULT_REQUIRED_FIELDS, DISCHARGE_DATE};
use crate::error::{MigrationError, Result};
use crate::observability::metrics;
use crate::pipeline::{Batch, Record};
use crate::store::{field, DocumentId, Filter, Namespace, StoreHandle, UpdateReport};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InsertReport {
    pub inserted_count: usize,
    pub generated_ids: Vec<DocumentId>,
}

/// Something wrong with the stored collection after a load
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerificationFinding {
    /// Document count differs from the batch, or required fields are absent
    IntegrityMismatch {
        expected_count: u64,
        stored_count: u64,
        missing_required_fields: BTreeSet<String>,
    },
    /// Stored documents break a record invariant
    InvariantViolation {
        invalid_date_count: u64,
        invalid_value_count: u64,
    },
}

impl VerificationFinding {
    pub fn label(&self) -> &'static str {
        match self {
            VerificationFinding::IntegrityMismatch { .. } => "integrity_mismatch",
            VerificationFinding::InvariantViolation { .. } => "invariant_violation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationReport {
    pub expected_count: u64,
    pub stored_count: u64,
    /// Stored count equals the expected count and no required field is missing
    pub matched: bool,
    pub missing_required_fields: BTreeSet<String>,
    pub findings: Vec<VerificationFinding>,
}

impl VerificationReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

/// A document read back from the collection
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: DocumentId,
    pub record: Record,
}

/// Read over the collection, built by [`Loader::read`].
///
/// Building a query does not touch the store. The store is queried when
/// [`Query::iter`], [`Query::fetch`] or [`Query::count`] is called, once per call.
pub struct Query<'a> {
    loader: &'a Loader,
    filter: Filter,
}

impl<'a> Query<'a> {
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Run the query now and iterate over the collected results
    pub fn iter(&self) -> Result<std::vec::IntoIter<StoredRecord>> {
        Ok(self.fetch()?.into_iter())
    }

    pub fn fetch(&self) -> Result<Vec<StoredRecord>> {
        let docs = self
            .loader
            .handle
            .store()
            .find(&self.loader.namespace, &self.filter)?;
        debug!("Read {} document(s) matching {}", docs.len(), self.filter);
        Ok(docs
            .into_iter()
            .map(|stored| StoredRecord {
                id: stored.id,
                record: Record::from_document(&stored.document),
            })
            .collect())
    }

    pub fn count(&self) -> Result<u64> {
        self.loader
            .handle
            .store()
            .count_documents(&self.loader.namespace, &self.filter)
    }
}

pub struct Loader {
    handle: StoreHandle,
    namespace: Namespace,
    required_fields: Vec<String>,
}

impl Loader {
    pub fn new(handle: StoreHandle, namespace: Namespace) -> Self {
        Self {
            handle,
            namespace,
            required_fields: DEFAULT_REQUIRED_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Connect to the store named by `uri` and target `namespace`
    pub fn connect(uri: &str, namespace: Namespace) -> Result<Self> {
        Ok(Self::new(StoreHandle::connect(uri)?, namespace))
    }

    /// Replace the fields `verify_load` requires on every document
    pub fn with_required_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn required_fields(&self) -> &[String] {
        &self.required_fields
    }

    /// Ordered insert of the whole batch, one document per record
    #[instrument(skip_all, fields(namespace = %self.namespace, batch = batch.len()))]
    pub fn bulk_insert(&self, batch: &Batch) -> Result<InsertReport> {
        if batch.is_empty() {
            info!("Empty batch, nothing to insert");
            return Ok(InsertReport::default());
        }

        let documents = batch.records().map(Record::to_document).collect();
        match self.handle.store().insert_many(&self.namespace, documents) {
            Ok(generated_ids) => {
                metrics::loader::documents_inserted(generated_ids.len());
                info!("Inserted {} document(s) into {}", generated_ids.len(), self.namespace);
                Ok(InsertReport {
                    inserted_count: generated_ids.len(),
                    generated_ids,
                })
            }
            Err(e) => {
                if let MigrationError::PartialInsert { inserted_count, failed_at, .. } = &e {
                    metrics::loader::documents_inserted(*inserted_count);
                    warn!(
                        "Bulk insert aborted at position {} with {} document(s) already committed",
                        failed_at, inserted_count
                    );
                }
                metrics::loader::insert_failure();
                Err(e)
            }
        }
    }

    /// Compare the collection against the expected document count and the
    /// record invariants. Problems come back as findings.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub fn verify_load(&self, expected_count: u64) -> Result<VerificationReport> {
        let store = self.handle.store();
        let stored_count = store.count_documents(&self.namespace, &Filter::all())?;

        let mut missing_required_fields = BTreeSet::new();
        for required in &self.required_fields {
            if store.count_documents(&self.namespace, &field(required).exists(false))? > 0 {
                missing_required_fields.insert(required.clone());
            }
        }

        let negative = field(AGE).lt(0).or(field(BILLING_AMOUNT).lt(0));
        let invalid_value_count = store.count_documents(&self.namespace, &negative)?;
        let invalid_date_count = self.count_invalid_dates()?;

        let matched = stored_count == expected_count && missing_required_fields.is_empty();
        let mut findings = Vec::new();
        if !matched {
            findings.push(VerificationFinding::IntegrityMismatch {
                expected_count,
                stored_count,
                missing_required_fields: missing_required_fields.clone(),
            });
        }
        if invalid_date_count > 0 || invalid_value_count > 0 {
            findings.push(VerificationFinding::InvariantViolation {
                invalid_date_count,
                invalid_value_count,
            });
        }
        for finding in &findings {
            metrics::loader::verification_finding(finding.label());
            warn!("Verification finding: {:?}", finding);
        }

        info!(
            "Verified {}: {} stored, {} expected, matched={}",
            self.namespace, stored_count, expected_count, matched
        );
        Ok(VerificationReport {
            expected_count,
            stored_count,
            matched,
            missing_required_fields,
            findings,
        })
    }

    /// Documents whose discharge date is not after the admission date.
    /// Filters only compare a field with a constant, so this is a scan.
    fn count_invalid_dates(&self) -> Result<u64> {
        let both_dates = field(DATE_OF_ADMISSION).exists(true).and(field(DISCHARGE_DATE).exists(true));
        let count = self
            .read(both_dates)
            .iter()?
            .filter(|stored| {
                let admission = stored.record.get(DATE_OF_ADMISSION).and_then(|v| v.as_date());
                let discharge = stored.record.get(DISCHARGE_DATE).and_then(|v| v.as_date());
                matches!((admission, discharge), (Some(a), Some(d)) if d <= a)
            })
            .count();
        Ok(count as u64)
    }

    pub fn create(&self, record: &Record) -> Result<DocumentId> {
        let id = self.handle.store().insert_one(&self.namespace, record.to_document())?;
        debug!("Created document {} in {}", id, self.namespace);
        Ok(id)
    }

    /// Lazy read; see [`Query`]
    pub fn read(&self, filter: Filter) -> Query<'_> {
        Query { loader: self, filter }
    }

    /// Merge `fields` into every document matching `filter`
    pub fn update(&self, filter: &Filter, fields: &Record) -> Result<UpdateReport> {
        let report = self
            .handle
            .store()
            .update_many(&self.namespace, filter, &fields.to_document())?;
        debug!(
            "Updated {}: matched {}, modified {}",
            filter, report.matched_count, report.modified_count
        );
        Ok(report)
    }

    pub fn delete(&self, filter: &Filter) -> Result<u64> {
        let deleted = self.handle.store().delete_many(&self.namespace, filter)?;
        debug!("Deleted {} document(s) matching {}", deleted, filter);
        Ok(deleted)
    }

    /// Release the store connection
    pub fn close(self) -> Result<()> {
        self.handle.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::NAME;
    use chrono::NaiveDate;

    fn loader() -> Loader {
        Loader::connect("memory://localhost", Namespace::new("healthcare", "patients")).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn patient(name: &str, age: i64) -> Record {
        Record::new()
            .with(NAME, name)
            .with(AGE, age)
            .with(BILLING_AMOUNT, 1500.5)
            .with(DATE_OF_ADMISSION, date(2024, 1, 1))
            .with(DISCHARGE_DATE, date(2024, 1, 5))
            .with("Medical Condition", "Asthma")
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let loader = loader();
        let report = loader.bulk_insert(&Batch::default()).unwrap();
        assert_eq!(report, InsertReport::default());
        assert_eq!(loader.read(Filter::all()).count().unwrap(), 0);
    }

    #[test]
    fn test_verify_reports_missing_fields_and_invariants() {
        let loader = loader();
        loader.create(&patient("Alice Brown", 30)).unwrap();
        loader
            .create(
                &patient("Bob", 40)
                    .with(DISCHARGE_DATE, date(2023, 12, 1))
                    .with(BILLING_AMOUNT, -5.0),
            )
            .unwrap();
        loader.create(&Record::new().with(NAME, "Nobody")).unwrap();

        let report = loader.verify_load(3).unwrap();

        assert!(!report.matched);
        assert_eq!(report.stored_count, 3);
        assert!(report.missing_required_fields.contains(AGE));
        assert!(!report.missing_required_fields.contains(NAME));
        assert!(report.findings.contains(&VerificationFinding::InvariantViolation {
            invalid_date_count: 1,
            invalid_value_count: 1,
        }));
    }

    #[test]
    fn test_read_is_restartable_and_sees_later_writes() {
        let loader = loader();
        loader.create(&patient("Alice Brown", 90)).unwrap();
        let seniors = loader.read(field(AGE).gte(88));

        assert_eq!(seniors.iter().unwrap().count(), 1);
        loader.create(&patient("Carl Dunn", 95)).unwrap();
        let names: Vec<_> = seniors
            .iter()
            .unwrap()
            .filter_map(|s| s.record.get(NAME).and_then(|v| v.as_text()).map(str::to_string))
            .collect();
        assert_eq!(names, vec!["Alice Brown", "Carl Dunn"]);
    }

    #[test]
    fn test_iter_snapshots_results_when_called() {
        let loader = loader();
        loader.create(&patient("Alice Brown", 90)).unwrap();

        let seniors = loader.read(field(AGE).gte(88)).iter().unwrap();
        loader.create(&patient("Carl Dunn", 95)).unwrap();

        assert_eq!(seniors.count(), 1);
    }

    #[test]
    fn test_read_back_restores_dates() {
        let loader = loader();
        loader.create(&patient("Alice Brown", 30)).unwrap();
        let stored = loader.read(field(NAME).eq("Alice Brown")).fetch().unwrap();
        assert_eq!(
            stored[0].record.get(DATE_OF_ADMISSION).and_then(|v| v.as_date()),
            Some(date(2024, 1, 1))
        );
    }
}
