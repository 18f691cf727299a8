// Gateway with failure injection.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::persistence::{Gateway, GatewayError, MemoryGateway};

/// FlakyGateway stores values in memory, fails the keys it is told to
/// and slows down the writes of chosen values.
#[derive(Default)]
pub struct FlakyGateway {
    inner: MemoryGateway,
    failing_writes: Mutex<HashSet<String>>,
    failing_reads: AtomicBool,
    slow_writes: Mutex<HashMap<u64, Duration>>,
    writes: AtomicUsize,
}

impl FlakyGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every write of `key` fail.
    pub fn fail_writes_for(&self, key: &str) {
        self.failing_writes.lock().insert(key.to_string());
    }

    /// Makes every read fail.
    pub fn fail_reads(&self, v: bool) {
        self.failing_reads.store(v, Ordering::Relaxed);
    }

    /// Delays every write of `value` by `delay`.
    pub fn delay_writes_of(&self, value: u64, delay: Duration) {
        self.slow_writes.lock().insert(value, delay);
    }

    /// Number of successful writes.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// Reads a value directly, bypassing failure injection.
    pub async fn peek(&self, key: &str) -> Option<u64> {
        self.inner.get(key).await.ok().flatten()
    }
}

#[async_trait::async_trait]
impl Gateway for FlakyGateway {
    async fn get(&self, key: &str) -> Result<Option<u64>, GatewayError> {
        if self.failing_reads.load(Ordering::Relaxed) {
            return Err(GatewayError::Connection("connection refused".to_string()));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: u64) -> Result<(), GatewayError> {
        if self.failing_writes.lock().contains(key) {
            return Err(GatewayError::Command(format!("write of {} refused", key)));
        }
        let delay = self.slow_writes.lock().get(&value).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.set(key, value).await?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
