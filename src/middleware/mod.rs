// HTTP middlewares.

pub mod access_log_middleware;
pub mod middleware;
pub mod recover_middleware;

pub use access_log_middleware::AccessLogMiddleware;
pub use recover_middleware::PanicRecoverMiddleware;
