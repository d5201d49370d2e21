//! Runs against a live deployment:
//! `PATIENT_MIGRATOR_MONGODB_URI=mongodb://localhost:27017 cargo test --features mongodb -- --ignored`
#![cfg(feature = "mongodb")]

use anyhow::Result;
use chrono::NaiveDate;
use mongodb::bson::{doc, Document as BsonDocument};
use mongodb::options::IndexOptions;
use mongodb::IndexModel;
use patient_migrator::constants::{AGE, BILLING_AMOUNT, DATE_OF_ADMISSION, DISCHARGE_DATE, NAME, ROOM_NUMBER};
use patient_migrator::pipeline::{Batch, Record};
use patient_migrator::store::{field, Filter, Namespace, UpdateReport};
use patient_migrator::{Loader, MigrationError};
use uuid::Uuid;

fn uri() -> String {
    std::env::var("PATIENT_MIGRATOR_MONGODB_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string())
}

fn scratch_namespace() -> Namespace {
    Namespace::new("patient_migrator_test", format!("patients_{}", Uuid::new_v4().simple()))
}

fn patient(name: &str, age: i64) -> Record {
    let date = |d| NaiveDate::from_ymd_opt(2024, 3, d).unwrap();
    Record::new()
        .with(NAME, name)
        .with(AGE, age)
        .with(BILLING_AMOUNT, 2500.0)
        .with(ROOM_NUMBER, 101i64)
        .with(DATE_OF_ADMISSION, date(1))
        .with(DISCHARGE_DATE, date(5))
}

fn drop_collection(namespace: &Namespace) -> Result<()> {
    mongodb::sync::Client::with_uri_str(uri())?
        .database(&namespace.database)
        .collection::<BsonDocument>(&namespace.collection)
        .drop(None)?;
    Ok(())
}

#[test]
#[ignore = "needs a running MongoDB"]
fn test_crud_round_trip() -> Result<()> {
    let namespace = scratch_namespace();
    let loader = Loader::connect(&uri(), namespace.clone())?;

    let batch = Batch::from_records((0..5).map(|i| patient(&format!("Patient {}", i), 85 + i)));
    assert_eq!(loader.bulk_insert(&batch)?.inserted_count, 5);
    assert!(loader.verify_load(5)?.matched);

    assert_eq!(loader.read(field(AGE).gte(88)).count()?, 2);
    assert_eq!(loader.read(field(AGE).lt(86).or(field(AGE).gt(88))).count()?, 2);
    assert_eq!(loader.read(field("Doctor").exists(false)).count()?, 5);

    let by_name = field(NAME).eq("Patient 0");
    let room = Record::new().with(ROOM_NUMBER, 203i64);
    assert_eq!(loader.update(&by_name, &room)?, UpdateReport { matched_count: 1, modified_count: 1 });
    assert_eq!(loader.update(&by_name, &room)?, UpdateReport { matched_count: 1, modified_count: 0 });

    let stored = loader.read(by_name.clone()).fetch()?;
    assert_eq!(stored[0].record.get(ROOM_NUMBER).and_then(|v| v.as_f64()), Some(203.0));
    assert_eq!(
        stored[0].record.get(DISCHARGE_DATE).and_then(|v| v.as_date()),
        NaiveDate::from_ymd_opt(2024, 3, 5)
    );

    assert_eq!(loader.delete(&by_name)?, 1);
    assert_eq!(loader.read(Filter::all()).count()?, 4);
    loader.close()?;

    drop_collection(&namespace)
}

#[test]
#[ignore = "needs a running MongoDB"]
fn test_ordered_insert_stops_at_first_rejected_document() -> Result<()> {
    let namespace = scratch_namespace();
    mongodb::sync::Client::with_uri_str(uri())?
        .database(&namespace.database)
        .collection::<BsonDocument>(&namespace.collection)
        .create_index(
            IndexModel::builder()
                .keys(doc! { "Name": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build(),
            None,
        )?;

    let loader = Loader::connect(&uri(), namespace.clone())?;
    let batch = Batch::from_records(vec![
        patient("Alice Brown", 29),
        patient("Bob Stone", 70),
        patient("Alice Brown", 31),
        patient("Carl Dunn", 95),
    ]);

    match loader.bulk_insert(&batch) {
        Err(MigrationError::PartialInsert {
            inserted_count,
            failed_at,
            ..
        }) => {
            assert_eq!(inserted_count, 2);
            assert_eq!(failed_at, 2);
        }
        other => panic!("expected a partial insert, got {other:?}"),
    }
    assert_eq!(loader.read(Filter::all()).count()?, 2);
    loader.close()?;

    drop_collection(&namespace)
}
