//! Redis-backed gateway.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::info;

use super::{parse_value, Gateway, GatewayError};
use crate::config::{Persistence, DEFAULT_REDIS_ADDR};

/// RedisGateway connects lazily, so an unreachable Redis never blocks startup.
pub struct RedisGateway {
    client: redis::Client,
    conn: Mutex<Option<ConnectionManager>>,
    timeout: Duration,
}

impl RedisGateway {
    /// Creates a gateway for the configured address. Does not connect.
    pub fn new(cfg: &Persistence, request_timeout: Duration) -> Result<Self> {
        let url = connection_url(cfg);
        let client = redis::Client::open(url.as_str())
            .with_context(|| format!("invalid redis address {:?}", cfg.addr))?;

        Ok(Self {
            client,
            conn: Mutex::new(None),
            timeout: request_timeout,
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, GatewayError> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let conn = timeout(self.timeout, ConnectionManager::new(self.client.clone()))
            .await
            .map_err(|_| GatewayError::Timeout(self.timeout))?
            .map_err(|e| GatewayError::Connection(e.to_string()))?;

        info!(
            component = "redis",
            event = "connected",
            "connected to redis"
        );

        *guard = Some(conn.clone());
        Ok(conn)
    }
}

#[async_trait::async_trait]
impl Gateway for RedisGateway {
    async fn get(&self, key: &str) -> Result<Option<u64>, GatewayError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = timeout(self.timeout, conn.get::<_, Option<String>>(key))
            .await
            .map_err(|_| GatewayError::Timeout(self.timeout))?
            .map_err(|e| GatewayError::Command(e.to_string()))?;

        raw.map(|raw| parse_value(key, &raw)).transpose()
    }

    async fn set(&self, key: &str, value: u64) -> Result<(), GatewayError> {
        let mut conn = self.connection().await?;
        timeout(self.timeout, conn.set::<_, _, ()>(key, value))
            .await
            .map_err(|_| GatewayError::Timeout(self.timeout))?
            .map_err(|e| GatewayError::Command(e.to_string()))
    }
}

/// Builds `redis://[:password@]host:port/db` from the persistence section.
/// A full `redis://` or `rediss://` address is used as is.
pub fn connection_url(cfg: &Persistence) -> String {
    let addr = cfg
        .addr
        .as_deref()
        .filter(|a| !a.is_empty())
        .unwrap_or(DEFAULT_REDIS_ADDR);

    if addr.starts_with("redis://") || addr.starts_with("rediss://") {
        return addr.to_string();
    }

    let auth = match cfg.password.as_deref() {
        Some(password) if !password.is_empty() => {
            format!(":{}@", urlencoding::encode(password))
        }
        _ => String::new(),
    };

    format!("redis://{}{}/{}", auth, addr, cfg.db.unwrap_or(0))
}
