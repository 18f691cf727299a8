// Configuration loading and management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::counters::{MetricDefinition, MetricDetail};

pub const PROD: &str = "prod";
#[allow(dead_code)]
pub const DEV: &str = "dev";
#[allow(dead_code)]
pub const TEST: &str = "test";

pub const DEFAULT_PORT: &str = "8200";
pub const DEFAULT_REDIS_ADDR: &str = "localhost:6379";
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

pub const ENV_APP_ENV: &str = "APP_ENV";
pub const ENV_PORT: &str = "PORT";
pub const ENV_REDIS_DSN: &str = "REDIS_DSN";
pub const ENV_REDIS_PASSWORD: &str = "REDIS_PASSWORD";
pub const ENV_REDIS_DB: &str = "REDIS_DB";
pub const ENV_REDIS_SYNC_INTERVAL: &str = "REDIS_SYNC_INTERVAL";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Exporter {
    #[serde(rename = "exporter")]
    pub exporter: ExporterBox,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExporterBox {
    pub env: String,
    pub logs: Option<Logs>,
    pub api: Option<Api>,
    pub persistence: Option<Persistence>,
    pub k8s: Option<K8S>,
    #[serde(default)]
    pub metrics: Vec<MetricDefinition>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Logs {
    pub level: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Api {
    pub name: Option<String>,
    pub port: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    Redis,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Persistence {
    pub driver: Option<Driver>,
    pub addr: Option<String>,
    pub password: Option<String>,
    pub db: Option<i64>,
    #[serde(default, rename = "sync_interval", with = "humantime_serde")]
    pub sync_interval: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    #[serde(default, rename = "persist_on_increment")]
    pub persist_on_increment: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Probe {
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct K8S {
    pub probe: Probe,
}

// Config trait
pub trait ConfigTrait {
    fn logs(&self) -> Option<&Logs>;
    fn is_prod(&self) -> bool;
    #[allow(dead_code)]
    fn is_test(&self) -> bool;
    fn api(&self) -> Option<&Api>;
    fn persistence(&self) -> Option<&Persistence>;
    fn k8s(&self) -> Option<&K8S>;
    fn definitions(&self) -> &[MetricDefinition];
    fn driver(&self) -> Driver;
    fn sync_interval(&self) -> Duration;
    fn store_timeout(&self) -> Duration;
    fn persist_on_increment(&self) -> bool;
}

// Config type alias for convenience
pub type Config = Exporter;

impl ConfigTrait for Config {
    fn logs(&self) -> Option<&Logs> {
        self.exporter.logs.as_ref()
    }

    fn is_prod(&self) -> bool {
        self.exporter.env == PROD
    }

    fn is_test(&self) -> bool {
        self.exporter.env == TEST
    }

    fn api(&self) -> Option<&Api> {
        self.exporter.api.as_ref()
    }

    fn persistence(&self) -> Option<&Persistence> {
        self.exporter.persistence.as_ref()
    }

    fn k8s(&self) -> Option<&K8S> {
        self.exporter.k8s.as_ref()
    }

    fn definitions(&self) -> &[MetricDefinition] {
        &self.exporter.metrics
    }

    fn driver(&self) -> Driver {
        self.persistence()
            .and_then(|p| p.driver)
            .unwrap_or(Driver::Redis)
    }

    fn sync_interval(&self) -> Duration {
        self.persistence()
            .and_then(|p| p.sync_interval)
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_SYNC_INTERVAL)
    }

    fn store_timeout(&self) -> Duration {
        self.persistence()
            .and_then(|p| p.timeout)
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_STORE_TIMEOUT)
    }

    fn persist_on_increment(&self) -> bool {
        self.persistence()
            .map(|p| p.persist_on_increment)
            .unwrap_or(false)
    }
}

impl Config {
    /// Loads configuration from a YAML file and applies environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Resolve absolute path
        let abs_path = path
            .canonicalize()
            .with_context(|| format!("failed to resolve absolute config filepath: {:?}", path))?;

        // Read file
        let data = std::fs::read_to_string(&abs_path)
            .with_context(|| format!("read config yaml file {:?}", abs_path))?;

        let mut cfg = Self::from_yaml(&data)
            .with_context(|| format!("unmarshal yaml from {:?}", abs_path))?;
        cfg.apply_env(|name| std::env::var(name).ok())?;
        cfg.validate()?;

        Ok(cfg)
    }

    /// Builds the configuration from built-in defaults and environment overrides only.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env(|name| std::env::var(name).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parses YAML and fills in the sections the file left out.
    pub fn from_yaml(data: &str) -> Result<Self> {
        let mut cfg: Exporter = serde_yaml::from_str(data)?;
        if cfg.exporter.metrics.is_empty() {
            cfg.exporter.metrics = default_definitions();
        }
        Ok(cfg)
    }

    /// Overrides file values with environment variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(env) = lookup(ENV_APP_ENV).filter(|v| !v.is_empty()) {
            self.exporter.env = env;
        }

        if let Some(port) = lookup(ENV_PORT).filter(|v| !v.is_empty()) {
            let api = self.exporter.api.get_or_insert_with(|| Api {
                name: None,
                port: None,
            });
            api.port = Some(port);
        }

        let persistence = self
            .exporter
            .persistence
            .get_or_insert_with(Persistence::default);

        if let Some(addr) = lookup(ENV_REDIS_DSN).filter(|v| !v.is_empty()) {
            persistence.addr = Some(addr);
        }
        if let Some(password) = lookup(ENV_REDIS_PASSWORD) {
            persistence.password = Some(password);
        }
        if let Some(db) = lookup(ENV_REDIS_DB).filter(|v| !v.is_empty()) {
            let db = db
                .trim()
                .parse::<i64>()
                .with_context(|| format!("{} must be an integer, got {:?}", ENV_REDIS_DB, db))?;
            persistence.db = Some(db);
        }
        if let Some(secs) = lookup(ENV_REDIS_SYNC_INTERVAL).filter(|v| !v.is_empty()) {
            let secs = secs.trim().parse::<u64>().with_context(|| {
                format!(
                    "{} must be a number of seconds, got {:?}",
                    ENV_REDIS_SYNC_INTERVAL, secs
                )
            })?;
            persistence.sync_interval = Some(Duration::from_secs(secs));
        }

        Ok(())
    }

    /// Rejects definitions that would make the counter namespace ambiguous.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for definition in &self.exporter.metrics {
            if definition.metric_type.trim().is_empty() {
                anyhow::bail!("metric definition with empty type");
            }
            for detail in &definition.metrics {
                if detail.key.trim().is_empty() {
                    anyhow::bail!("metric type {:?} declares an empty key", definition.metric_type);
                }
                if !seen.insert((definition.metric_type.as_str(), detail.key.as_str())) {
                    anyhow::bail!(
                        "metric {:?}/{:?} is declared more than once",
                        definition.metric_type,
                        detail.key
                    );
                }
            }
        }
        Ok(())
    }
}

impl Default for Persistence {
    fn default() -> Self {
        Self {
            driver: Some(Driver::Redis),
            addr: Some(DEFAULT_REDIS_ADDR.to_string()),
            password: None,
            db: Some(0),
            sync_interval: Some(DEFAULT_SYNC_INTERVAL),
            timeout: Some(DEFAULT_STORE_TIMEOUT),
            persist_on_increment: false,
        }
    }
}

impl Default for Exporter {
    fn default() -> Self {
        Self {
            exporter: ExporterBox {
                env: PROD.to_string(),
                logs: Some(Logs {
                    level: Some("info".to_string()),
                }),
                api: Some(Api {
                    name: Some("promexporter".to_string()),
                    port: Some(DEFAULT_PORT.to_string()),
                }),
                persistence: Some(Persistence::default()),
                k8s: Some(K8S {
                    probe: Probe {
                        timeout: Some(Duration::from_secs(5)),
                    },
                }),
                metrics: default_definitions(),
            },
        }
    }
}

/// Metric table shipped with the parser deployment.
pub fn default_definitions() -> Vec<MetricDefinition> {
    vec![MetricDefinition {
        metric_type: "parser_images".to_string(),
        metrics: vec![
            MetricDetail::new(
                "cached_images_total",
                "Total number of found images that are already stored in the bucket",
            ),
            MetricDetail::new("successful_uploads_total", "Total number of uploads of images"),
            MetricDetail::new("empty_images_total", "Total number of sku without images"),
            MetricDetail::new("unhandled_errors_total", "Total number of unhandled errors"),
        ],
    }]
}

// Test config is always available for integration tests
mod test_config;
#[allow(dead_code)]
pub use test_config::new_test_config;

#[cfg(test)]
mod config_test;
