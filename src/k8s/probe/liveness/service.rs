// Service watched by the liveness probe.

use std::time::Duration;

/// A component reporting whether it can still do its job (HTTP server, sync loop).
pub trait Service: Send + Sync {
    /// Must answer within `timeout`; the probe treats a late answer as dead.
    fn is_alive(&self, timeout: Duration) -> bool;
}
