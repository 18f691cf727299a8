// HTTP API controllers.

pub mod controller;
pub mod metrics;
pub mod parser;
pub mod probe;

// Re-export controller types for convenience
pub use metrics::PrometheusMetricsController;
pub use parser::ParserMetricsController;
pub use probe::LivenessProbeController;
