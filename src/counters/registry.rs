//! Prometheus side of the counters.
//
//! The registry owns a local Prometheus recorder instead of installing a
//! global one, so every store (and every test) gets its own exposition.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use metrics_process::Collector;
use parking_lot::RwLock;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use super::metric_name;

/// Label distinguishing callers incrementing the same counter.
pub const SOURCE_LABEL: &str = "source";

pub const HTTP_PANICS_TOTAL: &str = "promexporter_http_panics_total";

/// MetricRegistry registers each counter exactly once and relays increments to it.
pub struct MetricRegistry {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
    registered: RwLock<HashSet<String>>,
    process: Option<Collector>,
}

impl MetricRegistry {
    /// Creates a registry exposing only the parser counters.
    pub fn new() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        let registry = Self {
            recorder,
            handle,
            registered: RwLock::new(HashSet::new()),
            process: None,
        };
        registry.describe_internal();
        registry
    }

    /// Creates a registry that also exposes process_* metrics (CPU, RSS, fds).
    pub fn with_process_metrics() -> Self {
        let mut registry = Self::new();
        let collector = Collector::default();
        metrics::with_local_recorder(&registry.recorder, || collector.describe());
        registry.process = Some(collector);
        registry
    }

    fn describe_internal(&self) {
        metrics::with_local_recorder(&self.recorder, || {
            metrics::describe_counter!(HTTP_PANICS_TOTAL, "Total number of recovered handler panics");
            metrics::counter!(HTTP_PANICS_TOTAL).absolute(0);
        });
    }

    /// Registers a counter under `<metric_type>_<key>` and advances it to `initial_value`.
    ///
    /// Returns false, without touching the recorder, when the name is already registered.
    pub fn register(&self, metric_type: &str, key: &str, description: &str, initial_value: u64) -> bool {
        let name = metric_name(metric_type, key);

        let mut registered = self.registered.write();
        if registered.contains(&name) {
            debug!(
                component = "registry",
                event = "already_registered",
                metric = %name,
                "metric is already registered"
            );
            return false;
        }

        metrics::with_local_recorder(&self.recorder, || {
            metrics::describe_counter!(name.clone(), description.to_string());
            metrics::counter!(name.clone(), SOURCE_LABEL => metric_type.to_string())
                .absolute(initial_value);
        });

        registered.insert(name.clone());

        info!(
            component = "registry",
            event = "registered",
            metric = %name,
            initial = initial_value,
            "metric registered"
        );

        true
    }

    /// Adds `delta` to the counter for `label_value`.
    ///
    /// Returns false when the counter was never registered.
    pub fn bump(&self, metric_type: &str, key: &str, label_value: &str, delta: u64) -> bool {
        let name = metric_name(metric_type, key);

        if !self.registered.read().contains(&name) {
            warn!(
                component = "registry",
                event = "bump_unregistered",
                metric = %name,
                "metric was never registered, increment dropped"
            );
            return false;
        }

        metrics::with_local_recorder(&self.recorder, || {
            metrics::counter!(name, SOURCE_LABEL => label_value.to_string()).increment(delta);
        });

        true
    }

    pub fn is_registered(&self, metric_type: &str, key: &str) -> bool {
        self.registered
            .read()
            .contains(&metric_name(metric_type, key))
    }

    /// Number of registered parser counters.
    pub fn len(&self) -> usize {
        self.registered.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counts a handler panic recovered by the HTTP layer.
    pub fn inc_panics(&self) {
        metrics::with_local_recorder(&self.recorder, || {
            metrics::counter!(HTTP_PANICS_TOTAL).increment(1);
        });
    }

    /// Renders the Prometheus text exposition.
    pub fn render(&self) -> String {
        if let Some(collector) = &self.process {
            metrics::with_local_recorder(&self.recorder, || collector.collect());
        }
        self.handle.render()
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}
