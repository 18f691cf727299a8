// Package sync flushes the counter store to the gateway and restores it on startup.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::counters::{CounterError, CounterStore};
use crate::persistence::{storage_key, Gateway};

/// Outcome of one flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub saved: usize,
    pub total: usize,
}

impl FlushReport {
    pub fn failed(&self) -> usize {
        self.total - self.saved
    }
}

impl fmt::Display for FlushReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "saved {} of {}", self.saved, self.total)
    }
}

/// Outcome of the startup load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
    pub missing: usize,
    pub failed: usize,
}

/// Synchronizer owns the flush schedule.
pub struct Synchronizer {
    store: Arc<CounterStore>,
    gateway: Arc<dyn Gateway>,
    every: Duration,
    flush_mu: Mutex<()>,
    is_running: AtomicBool,
}

impl Synchronizer {
    pub fn new(store: Arc<CounterStore>, gateway: Arc<dyn Gateway>, every: Duration) -> Self {
        Self {
            store,
            gateway,
            every,
            flush_mu: Mutex::new(()),
            is_running: AtomicBool::new(false),
        }
    }

    pub fn interval(&self) -> Duration {
        self.every
    }

    /// True while the periodic loop is running.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    /// Restores every declared counter from the gateway.
    ///
    /// Absent keys stay at zero; read failures are logged and skipped.
    pub async fn load_all(&self) -> LoadReport {
        info!(component = "sync", event = "load_started", "loading metrics from the store");

        let mut report = LoadReport::default();
        for definition in self.store.definitions() {
            for detail in &definition.metrics {
                let key = storage_key(&definition.metric_type, &detail.key);
                match self.gateway.get(&key).await {
                    Ok(Some(value)) => {
                        if let Err(e) = self.store.load(&definition.metric_type, &detail.key, value).await {
                            error!(
                                component = "sync",
                                event = "load_rejected",
                                key = %key,
                                error = %e,
                                "loaded value does not match a declared metric"
                            );
                            report.failed += 1;
                            continue;
                        }
                        info!(
                            component = "sync",
                            event = "loaded",
                            key = %key,
                            value = value,
                            "metric loaded"
                        );
                        report.loaded += 1;
                    }
                    Ok(None) => {
                        info!(
                            component = "sync",
                            event = "not_found",
                            key = %key,
                            "key not found in the store, initializing to 0"
                        );
                        report.missing += 1;
                    }
                    Err(e) => {
                        error!(
                            component = "sync",
                            event = "load_failed",
                            key = %key,
                            error = %e,
                            "error loading metric from the store"
                        );
                        report.failed += 1;
                    }
                }
            }
        }

        report
    }

    /// Writes the whole store to the gateway. A failed key does not stop the rest.
    pub async fn flush_all(&self) -> FlushReport {
        let _flushing = self.flush_mu.lock().await;
        let start = Instant::now();

        let snapshot = self.store.snapshot().await;
        let total = snapshot.len();
        let mut saved = 0;

        for counter in snapshot {
            let key = storage_key(&counter.metric_type, &counter.key);
            if self.write(&key, counter.value).await {
                saved += 1;
            }
        }

        let report = FlushReport { saved, total };
        if report.failed() == 0 {
            info!(
                component = "sync",
                event = "flush_finished",
                saved = saved,
                total = total,
                elapsed = ?start.elapsed(),
                "metrics were saved to the store: {}", report
            );
        } else {
            warn!(
                component = "sync",
                event = "flush_finished",
                saved = saved,
                total = total,
                elapsed = ?start.elapsed(),
                "metrics were partially saved to the store: {}", report
            );
        }

        report
    }

    /// Writes the current value of each key of `metric_type`.
    ///
    /// Values are read under the flush lock, so a slower writer can never
    /// store an older value over a newer one.
    pub async fn persist<'a, I>(&self, metric_type: &str, keys: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let _flushing = self.flush_mu.lock().await;

        let current = match self.store.get_all(metric_type).await {
            Ok(current) => current,
            Err(e) => {
                error!(
                    component = "sync",
                    event = "persist_rejected",
                    metric_type = %metric_type,
                    error = %e,
                    "persist of an undeclared metric type"
                );
                return;
            }
        };

        for key in keys {
            let Some(value) = current.get(key).copied() else {
                continue;
            };
            self.write(&storage_key(metric_type, key), value).await;
        }
    }

    /// Zeroes every counter of `metric_type` and persists the zeros.
    ///
    /// Runs under the flush lock, so a flush in progress cannot overwrite the zeros.
    pub async fn reset(&self, metric_type: &str) -> Result<usize, CounterError> {
        let _flushing = self.flush_mu.lock().await;
        self.store.reset(metric_type).await
    }

    async fn write(&self, key: &str, value: u64) -> bool {
        match self.gateway.set(key, value).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    component = "sync",
                    event = "save_failed",
                    key = %key,
                    error = %e,
                    "error saving metric to the store"
                );
                false
            }
        }
    }

    /// Flushes every interval until `shutdown_token` is cancelled.
    ///
    /// The termination flush is not part of the loop; the app runs it after the server drained.
    pub async fn run(self: Arc<Self>, shutdown_token: CancellationToken) {
        if !self.mark_running() {
            return;
        }
        self.run_loop(shutdown_token).await;
    }

    /// Marks the loop as running and spawns it, so `is_running` holds once this returns.
    pub fn spawn(self: &Arc<Self>, shutdown_token: CancellationToken) -> Option<JoinHandle<()>> {
        if !self.mark_running() {
            return None;
        }
        Some(tokio::task::spawn(self.clone().run_loop(shutdown_token)))
    }

    fn mark_running(&self) -> bool {
        self.is_running
            .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    async fn run_loop(self: Arc<Self>, shutdown_token: CancellationToken) {
        let mut ticker = interval_at(tokio::time::Instant::now() + self.every, self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            component = "sync",
            event = "started",
            interval = ?self.every,
            "sync loop started"
        );

        loop {
            tokio::select! {
                _ = shutdown_token.cancelled() => {
                    info!(component = "sync", event = "stopped", "sync loop stopped");
                    self.is_running.store(false, Ordering::Relaxed);
                    return;
                }
                _ = ticker.tick() => {
                    self.flush_all().await;
                }
            }
        }
    }
}
