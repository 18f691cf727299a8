//! Access log middleware.
//

use axum::{
    extract::{ConnectInfo, Request},
    http::header::USER_AGENT,
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::time::Instant;
use tracing::info;

/// AccessLogMiddleware logs one structured line per request.
pub struct AccessLogMiddleware;

impl AccessLogMiddleware {
    /// Creates a new access log middleware.
    pub fn new() -> Self {
        Self
    }
}

impl Default for AccessLogMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

/// Client address: first X-Forwarded-For hop, else the peer address.
fn client_ip(request: &Request) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return forwarded.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default()
}

pub async fn access_log_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let endpoint = request.uri().path().to_string();
    let client_ip = client_ip(&request);
    let user_agent = request
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let response = next.run(request).await;

    info!(
        component = "http",
        client_ip = %client_ip,
        method = %method,
        status = response.status().as_u16(),
        user_agent = %user_agent,
        latency = ?start.elapsed(),
        endpoint = %endpoint,
        "request processed"
    );

    response
}

impl crate::middleware::middleware::Middleware for AccessLogMiddleware {
    fn apply(&self, router: axum::Router) -> axum::Router {
        router.layer(axum::middleware::from_fn(access_log_middleware))
    }
}
