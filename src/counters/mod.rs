//! Counter registry: in-memory counter store and its Prometheus exposure.
//
//! Counters are declared once from the metric definitions table, grouped by
//! metric type, and never created on demand.

pub mod registry;
pub mod store;

#[cfg(test)]
mod store_test;

pub use registry::MetricRegistry;
pub use store::{CounterSnapshot, CounterStore, Increment};

use serde::{Deserialize, Serialize};

/// Declares every counter of one metric type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MetricDefinition {
    #[serde(rename = "type")]
    pub metric_type: String,
    pub metrics: Vec<MetricDetail>,
}

/// Key and help text of a single counter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MetricDetail {
    pub key: String,
    #[serde(default)]
    pub description: String,
}

impl MetricDetail {
    pub fn new(key: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
        }
    }
}

/// Errors of the counter store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CounterError {
    #[error("unknown metric type {0:?}")]
    UnknownType(String),
    #[error("unknown metric key {key:?} for type {metric_type:?}")]
    UnknownKey { metric_type: String, key: String },
    #[error("metric {key:?} of type {metric_type:?} is declared more than once")]
    Duplicate { metric_type: String, key: String },
    #[error("no metrics to increment")]
    EmptyBatch,
}

impl CounterError {
    /// True for errors caused by a request naming an undeclared counter.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::UnknownType(_) | Self::UnknownKey { .. })
    }
}

/// Prometheus metric name of a counter.
pub fn metric_name(metric_type: &str, key: &str) -> String {
    format!("{}_{}", metric_type, key)
}
