use crate::constants::{
    DEFAULT_COLLECTION, DEFAULT_DATABASE, DEFAULT_DATE_FORMATS, DEFAULT_INPUT, DEFAULT_REQUIRED_FIELDS,
    DEFAULT_STORE_URI,
};
use crate::error::{MigrationError, Result};
use crate::pipeline::{PipelineSettings, ValidationMode};
use crate::store::Namespace;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_STORE_URI: &str = "PATIENT_MIGRATOR_STORE_URI";
pub const ENV_DATABASE: &str = "PATIENT_MIGRATOR_DATABASE";
pub const ENV_COLLECTION: &str = "PATIENT_MIGRATOR_COLLECTION";
pub const ENV_MODE: &str = "PATIENT_MIGRATOR_MODE";
pub const ENV_INPUT: &str = "PATIENT_MIGRATOR_INPUT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub input: PathBuf,
    pub mode: ValidationMode,
    pub store: StoreConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Connection string, e.g. `memory://localhost` or `sqlite://data/patients.db`
    pub uri: String,
    pub database: String,
    pub collection: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub date_formats: Vec<String>,
    /// Fields every stored document must carry
    pub required_fields: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for the rotated JSON log; console only when unset
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: PathBuf::from(DEFAULT_INPUT),
            mode: ValidationMode::default(),
            store: StoreConfig::default(),
            pipeline: PipelineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_STORE_URI.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            date_formats: DEFAULT_DATE_FORMATS.iter().map(|f| f.to_string()).collect(),
            required_fields: DEFAULT_REQUIRED_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl Config {
    /// Defaults, then the TOML file if given, then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MigrationError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Override fields from `PATIENT_MIGRATOR_*` variables found by `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(uri) = lookup(ENV_STORE_URI) {
            self.store.uri = uri;
        }
        if let Some(database) = lookup(ENV_DATABASE) {
            self.store.database = database;
        }
        if let Some(collection) = lookup(ENV_COLLECTION) {
            self.store.collection = collection;
        }
        if let Some(mode) = lookup(ENV_MODE) {
            self.mode = mode.parse()?;
        }
        if let Some(input) = lookup(ENV_INPUT) {
            self.input = PathBuf::from(input);
        }
        Ok(())
    }

    pub fn namespace(&self) -> Namespace {
        Namespace::new(&self.store.database, &self.store.collection)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            mode: self.mode,
            date_formats: self.pipeline.date_formats.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.store.uri, "memory://localhost");
        assert_eq!(config.namespace(), Namespace::new("healthcare", "patients"));
        assert_eq!(config.input, PathBuf::from("healthcare_dataset.csv"));
        assert_eq!(config.mode, ValidationMode::Lenient);
        assert_eq!(config.pipeline.required_fields.len(), 6);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            mode = "strict"

            [store]
            uri = "sqlite://data/patients.db"
            "#,
        )
        .unwrap();
        assert_eq!(config.mode, ValidationMode::Strict);
        assert_eq!(config.store.uri, "sqlite://data/patients.db");
        assert_eq!(config.store.collection, "patients");
        assert_eq!(config.pipeline.date_formats[0], "%Y-%m-%d");
    }

    #[test]
    fn test_env_overrides_file() {
        let env: HashMap<&str, &str> = [
            (ENV_STORE_URI, "sqlite:///tmp/p.db"),
            (ENV_MODE, "STRICT"),
            (ENV_COLLECTION, ""),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config.store.uri, "sqlite:///tmp/p.db");
        assert_eq!(config.mode, ValidationMode::Strict);
        assert_eq!(config.store.collection, "patients");
    }

    #[test]
    fn test_bad_mode_is_config_error() {
        let mut config = Config::default();
        let err = config
            .apply_env(|key| (key == ENV_MODE).then(|| "sometimes".to_string()))
            .unwrap_err();
        assert!(matches!(err, MigrationError::Config(_)));
        assert!(matches!(
            Config::from_toml("mode = \"sometimes\""),
            Err(MigrationError::Toml(_))
        ));
    }
}
