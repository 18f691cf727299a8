//! Panic recovery middleware.
//

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::error;

use crate::counters::MetricRegistry;

/// PanicRecoverMiddleware turns a handler panic into a 500 and counts it.
pub struct PanicRecoverMiddleware {
    registry: Arc<MetricRegistry>,
}

impl PanicRecoverMiddleware {
    /// Creates a new panic recovery middleware.
    pub fn new(registry: Arc<MetricRegistry>) -> Self {
        Self { registry }
    }
}

fn panic_message(err: &(dyn Any + Send)) -> &str {
    if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic"
    }
}

impl crate::middleware::middleware::Middleware for PanicRecoverMiddleware {
    fn apply(&self, router: axum::Router) -> axum::Router {
        let registry = self.registry.clone();
        router.layer(CatchPanicLayer::custom(
            move |err: Box<dyn Any + Send + 'static>| -> Response {
                registry.inc_panics();
                error!(
                    component = "http",
                    event = "panic_recovered",
                    panic = %panic_message(err.as_ref()),
                    "handler panicked"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": "internal server error" })),
                )
                    .into_response()
            },
        ))
    }
}
