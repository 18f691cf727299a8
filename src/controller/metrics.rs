//! Metrics controller.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use std::sync::Arc;

use crate::counters::MetricRegistry;
use crate::http::Controller;

pub const PROMETHEUS_METRICS_PATH: &str = "/metrics";

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// PrometheusMetricsController serves the scrape endpoint.
pub struct PrometheusMetricsController {
    registry: Arc<MetricRegistry>,
}

impl PrometheusMetricsController {
    /// Creates a new Prometheus metrics controller.
    pub fn new(registry: Arc<MetricRegistry>) -> Self {
        Self { registry }
    }

    async fn get_metrics(State(registry): State<Arc<MetricRegistry>>) -> impl IntoResponse {
        (
            StatusCode::OK,
            [("content-type", CONTENT_TYPE)],
            registry.render(),
        )
    }
}

impl Controller for PrometheusMetricsController {
    fn add_route(&self, router: Router) -> Router {
        router.merge(
            Router::new()
                .route(PROMETHEUS_METRICS_PATH, get(Self::get_metrics))
                .with_state(self.registry.clone()),
        )
    }
}
