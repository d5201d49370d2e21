use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Failed to ingest {source_path}: {message}")]
    Ingest { source_path: String, message: String },

    #[error("Unparsable value on line {line} in column '{column}': '{value}'")]
    Parse {
        line: u64,
        column: String,
        value: String,
    },

    #[error("Integrity check failed: {rejected} invalid row(s), {duplicates} duplicate(s); first problem: {first_problem}")]
    Integrity {
        rejected: usize,
        duplicates: usize,
        first_problem: String,
    },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Insert aborted at batch position {failed_at} after {inserted_count} document(s) were committed: {message}")]
    PartialInsert {
        inserted_count: usize,
        failed_at: usize,
        message: String,
    },

    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("Store error: {message}")]
    Store { message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MigrationError {
    pub(crate) fn store(message: impl Into<String>) -> Self {
        MigrationError::Store {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MigrationError>;
