// Package http provides Middleware interface.

use axum::Router;

/// Middleware wraps the whole router; `HttpServer` applies them in reverse order.
pub trait Middleware: Send + Sync {
    /// Applies the middleware to the router.
    fn apply(&self, router: Router) -> Router;
}
