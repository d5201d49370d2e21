use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use patient_migrator::config::Config;
use patient_migrator::migration::{self, MigrationReport};
use patient_migrator::pipeline::{Pipeline, ValidationMode, ValidationSummary};
use patient_migrator::{logging, observability, Loader};
use std::fs;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "patient_migrator")]
#[command(about = "Validate patient encounter records and migrate them into a document store")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Source CSV file
    #[arg(long, global = true)]
    input: Option<PathBuf>,
    /// strict or lenient
    #[arg(long, global = true)]
    mode: Option<ValidationMode>,
    /// Store connection string, e.g. sqlite://data/patients.db
    #[arg(long, global = true)]
    store_uri: Option<String>,
    #[arg(long, global = true)]
    database: Option<String>,
    #[arg(long, global = true)]
    collection: Option<String>,
    /// Directory for the rotated JSON log
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    /// Write Prometheus metrics to this file on exit
    #[arg(long, global = true)]
    metrics_out: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline and load the accepted records
    Migrate {
        /// Write the migration report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Print the pre-load integrity report only
    Check,
    /// Create, read, update and delete a sample record
    CrudDemo,
}

impl GlobalArgs {
    /// Flags win over environment and file settings
    fn apply(&self, config: &mut Config) {
        if let Some(input) = &self.input {
            config.input = input.clone();
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(uri) = &self.store_uri {
            config.store.uri = uri.clone();
        }
        if let Some(database) = &self.database {
            config.store.database = database.clone();
        }
        if let Some(collection) = &self.collection {
            config.store.collection = collection.clone();
        }
        if let Some(log_dir) = &self.log_dir {
            config.logging.log_dir = Some(log_dir.clone());
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load environment variables
    dotenv::dotenv().ok();

    let mut config = Config::load(cli.global.config.as_deref()).context("Failed to load configuration")?;
    cli.global.apply(&mut config);

    let _log_guard = logging::init_logging(config.logging.log_dir.as_deref());
    let metrics = match &cli.global.metrics_out {
        Some(_) => Some(observability::init()?),
        None => None,
    };

    let result = match cli.command {
        Commands::Migrate { report } => run_migrate(&config, report),
        Commands::Check => run_check(&config),
        Commands::CrudDemo => run_crud_demo(&config),
    };

    if let (Some(handle), Some(path)) = (metrics, &cli.global.metrics_out) {
        fs::write(path, handle.render())
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
        info!("Metrics written to {}", path.display());
    }

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

fn run_migrate(config: &Config, report_path: Option<PathBuf>) -> anyhow::Result<()> {
    println!("🔄 Migrating {} into {}", config.input.display(), config.namespace());

    let report = migration::run(config).context("Migration failed")?;
    print_migration_report(&report);

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(&path, json).with_context(|| format!("Failed to write report to {}", path.display()))?;
        println!("📝 Report written to {}", path.display());
    }

    if report.verification.is_clean() {
        println!("✅ Migration completed and verified");
    } else {
        println!("⚠️  Migration completed with verification findings");
    }
    Ok(())
}

fn run_check(config: &Config) -> anyhow::Result<()> {
    let pipeline = Pipeline::new(config.pipeline_settings());
    let table = pipeline.ingest(&config.input)?;
    let summary = pipeline.validation_summary(&table);
    print_summary(&summary);
    Ok(())
}

fn run_crud_demo(config: &Config) -> anyhow::Result<()> {
    let loader = Loader::connect(&config.store.uri, config.namespace())?;
    let report = migration::crud_walkthrough(&loader).context("CRUD walk-through failed")?;
    loader.close()?;

    println!("➕ Created patient {}", report.created_id);
    println!("🔎 {} patient(s) aged 88 or over", report.seniors.len());
    for name in report.seniors.iter().take(10) {
        println!("   {}", name);
    }
    println!(
        "✏️  Update matched {}, modified {} (room now {})",
        report.update.matched_count,
        report.update.modified_count,
        report
            .updated_room_number
            .map(|n| n.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    );
    println!(
        "🗑️  Deleted {}, {} left after delete",
        report.deleted_count, report.remaining_after_delete
    );
    Ok(())
}

fn print_summary(summary: &ValidationSummary) {
    println!("📋 Integrity report over {} row(s)", summary.total_rows);
    println!("   duplicates:      {}", summary.duplicate_count);
    println!("   invalid dates:   {}", summary.invalid_date_count);
    println!("   invalid values:  {}", summary.invalid_value_count);
    println!("   unparsable rows: {}", summary.unparsable_count);
    for (column, missing) in summary.missing_values.iter().filter(|(_, n)| **n > 0) {
        println!("   missing {:<20} {}", column, missing);
    }
}

fn print_migration_report(report: &MigrationReport) {
    print_summary(&report.summary);
    println!("🧹 Removed {} duplicate row(s)", report.duplicates_removed);
    println!(
        "📊 Accepted {} of {} row(s), rejection rate {:.1}%",
        report.stats.accepted_count,
        report.stats.total_rows,
        report.stats.rejection_rate()
    );
    if !report.rejected.is_empty() {
        println!("❌ Rejected {} row(s):", report.rejected.len());
        for rejected in report.rejected.iter().take(20) {
            println!("   line {}: {}", rejected.line, rejected.reason);
        }
    }
    println!("📥 Inserted {} document(s)", report.insert.inserted_count);
    let v = &report.verification;
    println!(
        "🔍 Verification: {} stored, {} expected, matched={}",
        v.stored_count, v.expected_count, v.matched
    );
    if !v.missing_required_fields.is_empty() {
        println!("   missing required fields: {:?}", v.missing_required_fields);
    }
    for finding in &v.findings {
        println!("   finding: {:?}", finding);
    }
}
