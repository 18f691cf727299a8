//! Parser metrics controller: read, increment and reset counters of one metric type.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use crate::counters::{CounterError, CounterStore, Increment};
use crate::http::Controller;
use crate::sync::Synchronizer;

pub const PARSER_TYPE_PATH: &str = "/parser/:metric_type";
pub const PARSER_KEY_PATH: &str = "/parser/:metric_type/:key";

/// Query parameters of the single-key increment.
#[derive(Debug, Deserialize)]
struct IncrementQuery {
    by: Option<u64>,
    source: Option<String>,
}

/// One counter of a batch payload.
#[derive(Debug, Deserialize)]
pub struct MetricValue {
    pub key: String,
    pub value: u64,
}

/// Batch payload sent by the parsers.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsPayload {
    #[serde(default)]
    pub marketplace_code: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub parser_id: Option<String>,
    pub metrics: Vec<MetricValue>,
}

/// ParserMetricsController exposes the counter store over HTTP.
pub struct ParserMetricsController {
    store: Arc<CounterStore>,
    sync: Arc<Synchronizer>,
    persist_on_increment: bool,
}

impl ParserMetricsController {
    /// Creates a new parser metrics controller.
    pub fn new(store: Arc<CounterStore>, sync: Arc<Synchronizer>, persist_on_increment: bool) -> Self {
        Self {
            store,
            sync,
            persist_on_increment,
        }
    }

    /// GET: every counter of the type.
    async fn get_all(
        Path(metric_type): Path<String>,
        State(controller): State<Arc<Self>>,
    ) -> Response {
        match controller.store.get_all(&metric_type).await {
            Ok(values) => (StatusCode::OK, Json(values)).into_response(),
            Err(e) => error_response(e),
        }
    }

    /// POST with a key: increments one counter.
    async fn increment(
        Path((metric_type, key)): Path<(String, String)>,
        Query(params): Query<IncrementQuery>,
        State(controller): State<Arc<Self>>,
    ) -> Response {
        let source = params
            .source
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| metric_type.clone());
        let increments = [Increment::new(key, params.by.unwrap_or(1))];

        controller.apply(&metric_type, &source, &increments).await
    }

    /// POST with a payload: increments a batch of counters atomically.
    async fn increment_batch(
        Path(metric_type): Path<String>,
        State(controller): State<Arc<Self>>,
        Json(payload): Json<MetricsPayload>,
    ) -> Response {
        let source = payload
            .marketplace_code
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| metric_type.clone());
        let increments: Vec<Increment> = payload
            .metrics
            .into_iter()
            .map(|m| Increment::new(m.key, m.value))
            .collect();

        controller.apply(&metric_type, &source, &increments).await
    }

    /// DELETE: zeroes every counter of the type and persists the zeros.
    async fn reset(
        Path(metric_type): Path<String>,
        State(controller): State<Arc<Self>>,
    ) -> Response {
        match controller.sync.reset(&metric_type).await {
            Ok(_) => (
                StatusCode::OK,
                Json(serde_json::json!({ "message": "Metrics reset" })),
            )
                .into_response(),
            Err(e) => error_response(e),
        }
    }

    async fn apply(&self, metric_type: &str, source: &str, increments: &[Increment]) -> Response {
        let updated = match self.store.increment_batch(metric_type, source, increments).await {
            Ok(updated) => updated,
            Err(e) => return error_response(e),
        };

        if self.persist_on_increment {
            self.sync
                .persist(metric_type, updated.keys().map(String::as_str))
                .await;
        }

        (StatusCode::OK, Json(updated)).into_response()
    }
}

fn error_response(e: CounterError) -> Response {
    if e.is_not_found() {
        warn!(
            component = "parser",
            event = "unknown_metric",
            error = %e,
            "request for an undeclared metric"
        );
    }
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": e.to_string() })),
    )
        .into_response()
}

impl Controller for ParserMetricsController {
    fn add_route(&self, router: Router) -> Router {
        let controller = Arc::new(self.clone());
        router.merge(
            Router::new()
                .route(
                    PARSER_TYPE_PATH,
                    get(Self::get_all)
                        .post(Self::increment_batch)
                        .delete(Self::reset),
                )
                .route(PARSER_KEY_PATH, post(Self::increment))
                .with_state(controller),
        )
    }
}

impl Clone for ParserMetricsController {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            sync: self.sync.clone(),
            persist_on_increment: self.persist_on_increment,
        }
    }
}
