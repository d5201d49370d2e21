use anyhow::Result;
use patient_migrator::config::Config;
use patient_migrator::constants::{NAME, ROOM_NUMBER};
use patient_migrator::migration::{self, crud_walkthrough};
use patient_migrator::pipeline::ValidationMode;
use patient_migrator::store::{field, DocumentStore, Filter, SqliteStore};
use patient_migrator::{Loader, MigrationError};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/healthcare_sample.csv")
}

fn sqlite_config(dir: &TempDir, mode: ValidationMode) -> Config {
    let mut config = Config::default();
    config.input = fixture();
    config.mode = mode;
    config.store.uri = format!("sqlite://{}", dir.path().join("healthcare.db").display());
    config
}

#[test]
fn test_lenient_migration_loads_and_verifies() -> Result<()> {
    let dir = TempDir::new()?;
    let config = sqlite_config(&dir, ValidationMode::Lenient);

    let report = migration::run(&config)?;

    assert_eq!(report.insert.inserted_count, 3);
    assert_eq!(report.duplicates_removed, 1);
    assert_eq!(report.rejected.len(), 4);
    assert_eq!(report.stats.accepted_count, report.insert.inserted_count);
    assert_eq!(report.stats.rejected_count, 4);
    assert!(report.verification.matched);
    assert!(report.verification.is_clean());
    assert_eq!(report.verification.stored_count, 3);

    let json = serde_json::to_value(&report)?;
    assert_eq!(json["verification"]["matched"], true);
    assert_eq!(json["rejected"][1]["reason"]["kind"], "invalid_age");
    assert_eq!(json["stats"]["total_rows"], 7);

    let store = SqliteStore::open(dir.path().join("healthcare.db"))?;
    let names: Vec<String> = store
        .find(&config.namespace(), &Filter::all())?
        .into_iter()
        .filter_map(|d| d.document.get(NAME).and_then(|v| v.as_str()).map(str::to_string))
        .collect();
    assert_eq!(names, vec!["Bobby Jackson", "Leslie Terry", "Frank Moore"]);
    Ok(())
}

#[test]
fn test_strict_migration_inserts_nothing() -> Result<()> {
    let dir = TempDir::new()?;
    let config = sqlite_config(&dir, ValidationMode::Strict);

    let err = migration::run(&config).unwrap_err();
    assert!(matches!(err, MigrationError::Parse { .. }));

    let store = SqliteStore::open(dir.path().join("healthcare.db"))?;
    assert_eq!(store.count_documents(&config.namespace(), &Filter::all())?, 0);
    Ok(())
}

#[test]
fn test_rerun_into_same_collection_is_flagged() -> Result<()> {
    let dir = TempDir::new()?;
    let config = sqlite_config(&dir, ValidationMode::Lenient);

    migration::run(&config)?;
    let second = migration::run(&config)?;

    assert_eq!(second.insert.inserted_count, 3);
    assert!(!second.verification.matched);
    assert_eq!(second.verification.stored_count, 6);
    Ok(())
}

#[test]
fn test_crud_walkthrough_after_migration() -> Result<()> {
    let dir = TempDir::new()?;
    let config = sqlite_config(&dir, ValidationMode::Lenient);
    migration::run(&config)?;

    let loader = Loader::connect(&config.store.uri, config.namespace())?;
    let report = crud_walkthrough(&loader)?;

    assert_eq!(report.seniors, vec!["Frank Moore"]);
    assert_eq!(report.update.matched_count, 1);
    assert_eq!(report.update.modified_count, 1);
    assert_eq!(report.updated_room_number, Some(203));
    assert_eq!(report.deleted_count, 1);
    assert_eq!(report.remaining_after_delete, 0);

    assert_eq!(loader.read(Filter::all()).count()?, 3);
    assert_eq!(loader.read(field(ROOM_NUMBER).eq(203)).count()?, 0);
    loader.close()?;
    Ok(())
}

#[test]
fn test_missing_input_fails_before_connecting() {
    let mut config = Config::default();
    config.input = PathBuf::from("no/such/file.csv");
    config.store.uri = "mongodb://admin:pw@localhost".to_string();

    let err = migration::run(&config).unwrap_err();
    assert!(matches!(err, MigrationError::Ingest { .. }));
}
