//! Persistence gateway used to checkpoint counters across restarts.

pub mod memory;
pub mod redis_gateway;


pub use self::memory::MemoryGateway;
pub use self::redis_gateway::RedisGateway;

use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, ConfigTrait, Driver};

const KEY_PREFIX: &str = "prometheus";

/// Errors returned by a gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("store request timed out after {0:?}")]
    Timeout(Duration),
    #[error("store connection failed: {0}")]
    Connection(String),
    #[error("store command failed: {0}")]
    Command(String),
    #[error("stored value {value:?} under {key:?} is not a counter")]
    InvalidValue { key: String, value: String },
}

/// Key-value store the counters are checkpointed to.
#[async_trait::async_trait]
pub trait Gateway: Send + Sync {
    /// Reads a value; `Ok(None)` means the key is absent.
    async fn get(&self, key: &str) -> Result<Option<u64>, GatewayError>;

    /// Writes a value.
    async fn set(&self, key: &str, value: u64) -> Result<(), GatewayError>;
}

/// Store key of a counter: `prometheus:<metric_type>:<metric_key>`.
pub fn storage_key(metric_type: &str, key: &str) -> String {
    format!("{}:{}:{}", KEY_PREFIX, metric_type, key)
}

/// Parses a stored counter. Older snapshots were written as floats.
pub fn parse_value(key: &str, raw: &str) -> Result<u64, GatewayError> {
    let raw = raw.trim();
    if let Ok(v) = raw.parse::<u64>() {
        return Ok(v);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v as u64),
        _ => Err(GatewayError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}

/// Builds the gateway selected by configuration.
pub fn from_config(cfg: &Config) -> anyhow::Result<Arc<dyn Gateway>> {
    match cfg.driver() {
        Driver::Memory => Ok(Arc::new(MemoryGateway::new())),
        Driver::Redis => {
            let persistence = cfg.persistence().cloned().unwrap_or_default();
            let gateway = RedisGateway::new(&persistence, cfg.store_timeout())?;
            Ok(Arc::new(gateway))
        }
    }
}
