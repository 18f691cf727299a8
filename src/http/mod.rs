// HTTP module: server and shared interfaces.

pub mod server;

// Re-export middleware interfaces from the dedicated middleware module
pub use crate::middleware::middleware::Middleware;

// Re-export server types
pub use server::HttpServer;

// Common controller interface
pub use crate::controller::controller::Controller;
