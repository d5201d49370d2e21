//! End-to-end migration run and the CRUD walk-through.

use crate::config::Config;
use crate::constants::{
    ADMISSION_TYPE, AGE, BILLING_AMOUNT, BLOOD_TYPE, DATE_OF_ADMISSION, DISCHARGE_DATE, DOCTOR, GENDER, HOSPITAL,
    INSURANCE_PROVIDER, MEDICAL_CONDITION, MEDICATION, NAME, ROOM_NUMBER, TEST_RESULTS,
};
use crate::error::Result;
use crate::loader::{InsertReport, Loader, StoredRecord, VerificationReport};
use crate::pipeline::{FieldValue, Pipeline, Record, RejectedRow, ValidationStats, ValidationSummary};
use crate::store::{field, DocumentId, UpdateReport};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, instrument};

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub summary: ValidationSummary,
    pub stats: ValidationStats,
    pub rejected: Vec<RejectedRow>,
    pub duplicates_removed: usize,
    pub insert: InsertReport,
    pub verification: VerificationReport,
}

/// Pipeline, bulk insert, verification. The store connection is released on
/// every path out of here.
#[instrument(skip_all, fields(input = %config.input.display(), mode = %config.mode))]
pub fn run(config: &Config) -> Result<MigrationReport> {
    let pipeline = Pipeline::new(config.pipeline_settings());
    let outcome = pipeline.run(&config.input)?;
    info!(
        "Pipeline accepted {} record(s), rejected {}, removed {} duplicate(s)",
        outcome.batch.len(),
        outcome.rejected.len(),
        outcome.duplicates_removed
    );

    let loader = Loader::connect(&config.store.uri, config.namespace())?
        .with_required_fields(config.pipeline.required_fields.iter().cloned());
    let insert = loader.bulk_insert(&outcome.batch)?;
    let verification = loader.verify_load(insert.inserted_count as u64)?;
    loader.close()?;

    Ok(MigrationReport {
        summary: outcome.summary,
        stats: outcome.stats,
        rejected: outcome.rejected,
        duplicates_removed: outcome.duplicates_removed,
        insert,
        verification,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct CrudWalkthroughReport {
    pub created_id: DocumentId,
    /// Names of the documents with `Age >= 88`
    pub seniors: Vec<String>,
    pub update: UpdateReport,
    pub updated_room_number: Option<i64>,
    pub deleted_count: u64,
    /// Documents still matching the name after the delete
    pub remaining_after_delete: usize,
}

/// The encounter record used by the walk-through
pub fn sample_patient() -> Record {
    let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).map_or(FieldValue::Null, FieldValue::Date);
    Record::new()
        .with(NAME, "Alice Brown")
        .with(AGE, 29i64)
        .with(GENDER, "Female")
        .with(BLOOD_TYPE, "A+")
        .with(MEDICAL_CONDITION, "Asthma")
        .with(DATE_OF_ADMISSION, date(2024, 1, 10))
        .with(DOCTOR, "Dr. Smith")
        .with(HOSPITAL, "General Hospital")
        .with(INSURANCE_PROVIDER, "Medicare")
        .with(BILLING_AMOUNT, 1500.75)
        .with(ROOM_NUMBER, 101i64)
        .with(ADMISSION_TYPE, "Emergency")
        .with(DISCHARGE_DATE, date(2024, 1, 15))
        .with(MEDICATION, "Albuterol")
        .with(TEST_RESULTS, "Normal")
}

/// Create, read, update and delete one record against the loader's collection
#[instrument(skip_all, fields(namespace = %loader.namespace()))]
pub fn crud_walkthrough(loader: &Loader) -> Result<CrudWalkthroughReport> {
    let patient = sample_patient();
    let created_id = loader.create(&patient)?;
    info!("Created patient record {}", created_id);

    let seniors: Vec<String> = loader
        .read(field(AGE).gte(88))
        .iter()?
        .filter_map(|stored| name_of(&stored))
        .collect();
    info!("{} patient(s) aged 88 or over", seniors.len());

    let by_name = field(NAME).eq("Alice Brown");
    let changes = Record::new().with(ROOM_NUMBER, 203i64).with(BILLING_AMOUNT, 12000i64);
    let update = loader.update(&by_name, &changes)?;
    info!(
        "Updated Alice Brown: matched {}, modified {}",
        update.matched_count, update.modified_count
    );

    let updated_room_number = loader
        .read(by_name.clone())
        .iter()?
        .find(|stored| stored.id == created_id)
        .and_then(|stored| match stored.record.get(ROOM_NUMBER)?.as_f64()? {
            n if n.fract() == 0.0 => Some(n as i64),
            _ => None,
        });

    let deleted_count = loader.delete(&by_name)?;
    let remaining_after_delete = loader.read(by_name).iter()?.count();
    info!("Deleted {} record(s); {} left", deleted_count, remaining_after_delete);

    Ok(CrudWalkthroughReport {
        created_id,
        seniors,
        update,
        updated_room_number,
        deleted_count,
        remaining_after_delete,
    })
}

fn name_of(stored: &StoredRecord) -> Option<String> {
    stored.record.get(NAME)?.as_text().map(str::to_string)
}
