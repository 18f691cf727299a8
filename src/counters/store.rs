//! In-memory counter store.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

use super::{CounterError, MetricDefinition, MetricRegistry};
use crate::persistence::{storage_key, Gateway};

type Counters = BTreeMap<String, BTreeMap<String, u64>>;

/// One counter value captured for a flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub metric_type: String,
    pub key: String,
    pub value: u64,
}

/// Requested increment of one counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Increment {
    pub key: String,
    pub delta: u64,
}

impl Increment {
    pub fn new(key: impl Into<String>, delta: u64) -> Self {
        Self {
            key: key.into(),
            delta,
        }
    }
}

/// CounterStore is the single source of truth for counter values.
///
/// Every operation serializes on one lock. Only `reset` keeps it across
/// gateway writes.
pub struct CounterStore {
    counters: Mutex<Counters>,
    definitions: Vec<MetricDefinition>,
    registry: Arc<MetricRegistry>,
    gateway: Arc<dyn Gateway>,
}

impl CounterStore {
    /// Declares a zero-valued counter for every defined (type, key).
    pub fn new(
        definitions: Vec<MetricDefinition>,
        registry: Arc<MetricRegistry>,
        gateway: Arc<dyn Gateway>,
    ) -> Result<Self, CounterError> {
        let mut counters = Counters::new();

        for definition in &definitions {
            let keys = counters.entry(definition.metric_type.clone()).or_default();
            for detail in &definition.metrics {
                if keys.insert(detail.key.clone(), 0).is_some() {
                    return Err(CounterError::Duplicate {
                        metric_type: definition.metric_type.clone(),
                        key: detail.key.clone(),
                    });
                }
            }
        }

        Ok(Self {
            counters: Mutex::new(counters),
            definitions,
            registry,
            gateway,
        })
    }

    pub fn definitions(&self) -> &[MetricDefinition] {
        &self.definitions
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// Overwrites a declared counter. Never creates one.
    pub async fn load(&self, metric_type: &str, key: &str, value: u64) -> Result<(), CounterError> {
        let mut counters = self.counters.lock().await;
        let cell = cell_mut(&mut counters, metric_type, key)?;
        *cell = value;
        Ok(())
    }

    /// Registers every counter with its current value.
    pub async fn register_all(&self) -> usize {
        let counters = self.counters.lock().await;

        let mut registered = 0;
        for definition in &self.definitions {
            for detail in &definition.metrics {
                let value = counters
                    .get(&definition.metric_type)
                    .and_then(|keys| keys.get(&detail.key))
                    .copied()
                    .unwrap_or(0);
                if self
                    .registry
                    .register(&definition.metric_type, &detail.key, &detail.description, value)
                {
                    registered += 1;
                }
            }
        }

        registered
    }

    /// Returns every counter of `metric_type`.
    pub async fn get_all(&self, metric_type: &str) -> Result<BTreeMap<String, u64>, CounterError> {
        let counters = self.counters.lock().await;
        counters
            .get(metric_type)
            .cloned()
            .ok_or_else(|| CounterError::UnknownType(metric_type.to_string()))
    }

    /// Adds `delta` to a counter and returns the new value.
    pub async fn increment(&self, metric_type: &str, key: &str, delta: u64) -> Result<u64, CounterError> {
        let updated = self
            .increment_batch(metric_type, metric_type, &[Increment::new(key, delta)])
            .await?;
        Ok(updated.get(key).copied().unwrap_or_default())
    }

    /// Applies all increments or none of them; the registry sees them under `source`.
    pub async fn increment_batch(
        &self,
        metric_type: &str,
        source: &str,
        increments: &[Increment],
    ) -> Result<BTreeMap<String, u64>, CounterError> {
        if increments.is_empty() {
            return Err(CounterError::EmptyBatch);
        }

        let mut counters = self.counters.lock().await;
        let keys = counters
            .get_mut(metric_type)
            .ok_or_else(|| CounterError::UnknownType(metric_type.to_string()))?;

        if let Some(missing) = increments.iter().find(|inc| !keys.contains_key(&inc.key)) {
            return Err(CounterError::UnknownKey {
                metric_type: metric_type.to_string(),
                key: missing.key.clone(),
            });
        }

        let mut updated = BTreeMap::new();
        for inc in increments {
            if let Some(cell) = keys.get_mut(&inc.key) {
                *cell = cell.saturating_add(inc.delta);
                self.registry.bump(metric_type, &inc.key, source, inc.delta);
                updated.insert(inc.key.clone(), *cell);
            }
        }

        Ok(updated)
    }

    /// Zeroes every counter of `metric_type` and persists the zeros before returning.
    pub async fn reset(&self, metric_type: &str) -> Result<usize, CounterError> {
        let mut counters = self.counters.lock().await;
        let keys = counters
            .get_mut(metric_type)
            .ok_or_else(|| CounterError::UnknownType(metric_type.to_string()))?;

        for (key, value) in keys.iter_mut() {
            *value = 0;
            let storage_key = storage_key(metric_type, key);
            if let Err(e) = self.gateway.set(&storage_key, 0).await {
                error!(
                    component = "store",
                    event = "reset_persist_failed",
                    key = %storage_key,
                    error = %e,
                    "error saving metric to the store"
                );
            }
        }

        info!(
            component = "store",
            event = "reset",
            metric_type = %metric_type,
            keys = keys.len(),
            "metrics reset"
        );

        Ok(keys.len())
    }

    /// Copies every counter.
    pub async fn snapshot(&self) -> Vec<CounterSnapshot> {
        let counters = self.counters.lock().await;
        counters
            .iter()
            .flat_map(|(metric_type, keys)| {
                keys.iter().map(move |(key, value)| CounterSnapshot {
                    metric_type: metric_type.clone(),
                    key: key.clone(),
                    value: *value,
                })
            })
            .collect()
    }
}

fn cell_mut<'a>(counters: &'a mut Counters, metric_type: &str, key: &str) -> Result<&'a mut u64, CounterError> {
    counters
        .get_mut(metric_type)
        .ok_or_else(|| CounterError::UnknownType(metric_type.to_string()))?
        .get_mut(key)
        .ok_or_else(|| CounterError::UnknownKey {
            metric_type: metric_type.to_string(),
            key: key.to_string(),
        })
}
