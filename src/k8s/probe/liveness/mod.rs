// Package liveness provides Kubernetes liveness probe functionality.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

pub mod error;
pub mod service;


pub use error::TimeoutIsTooShortError;
pub use service::Service;

const MIN_TIMEOUT: Duration = Duration::from_millis(1);

/// Liveness probe over a set of watched services.
pub struct Probe {
    services: RwLock<Vec<Arc<dyn Service>>>,
    timeout: Duration,
}

impl Probe {
    /// Creates a new liveness probe
    pub fn new(timeout_duration: Duration) -> Self {
        let timeout = if timeout_duration < MIN_TIMEOUT {
            warn!(
                error = %TimeoutIsTooShortError,
                "min timeout duration is 1ms (timeout set up as 10ms as a more reasonable value)"
            );
            Duration::from_millis(10)
        } else {
            timeout_duration
        };

        Self {
            services: RwLock::new(Vec::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Starts watching services. Until then the probe reports not alive.
    pub fn watch(&self, services: Vec<Arc<dyn Service>>) {
        self.services.write().extend(services);
    }

    /// Checks whether every watched service is alive within the probe timeout.
    pub async fn is_alive(&self) -> bool {
        let services = self.services.read().clone();
        if services.is_empty() {
            return false;
        }

        let probe_timeout = self.timeout;
        let check = tokio::task::spawn_blocking(move || {
            services.iter().all(|service| service.is_alive(probe_timeout))
        });

        match timeout(probe_timeout, check).await {
            Ok(Ok(alive)) => alive,
            Ok(Err(e)) => {
                warn!(error = %e, "liveness check task failed");
                false
            }
            Err(_) => {
                warn!("liveness probe deadline exceeded while checking service");
                false
            }
        }
    }
}
