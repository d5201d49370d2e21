// Observability: Prometheus metrics for the migration phases

pub mod metrics;

pub use metrics::{init, MetricName};
