pub mod config;
pub mod constants;
pub mod error;
pub mod loader;
pub mod logging;
pub mod migration;
pub mod observability;
pub mod pipeline;
pub mod store;

pub use config::Config;
pub use error::{MigrationError, Result};
pub use loader::{InsertReport, Loader, VerificationFinding, VerificationReport};
pub use pipeline::{Pipeline, ValidationMode};
