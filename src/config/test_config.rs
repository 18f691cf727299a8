use super::{Api, Config, Driver, ExporterBox, Logs, Persistence, Probe, K8S};
use crate::counters::{MetricDefinition, MetricDetail};
use std::time::Duration;

/// Creates a new test configuration backed by the in-memory gateway.
pub fn new_test_config() -> Config {
    Config {
        exporter: ExporterBox {
            env: super::TEST.to_string(),
            logs: Some(Logs {
                level: Some("debug".to_string()),
            }),
            api: Some(Api {
                name: Some("promexporter:8291".to_string()),
                port: Some("8291".to_string()),
            }),
            persistence: Some(Persistence {
                driver: Some(Driver::Memory),
                addr: None,
                password: None,
                db: Some(0),
                sync_interval: Some(Duration::from_secs(3600)),
                timeout: Some(Duration::from_secs(1)),
                persist_on_increment: false,
            }),
            k8s: Some(K8S {
                probe: Probe {
                    timeout: Some(Duration::from_secs(1)),
                },
            }),
            metrics: vec![
                MetricDefinition {
                    metric_type: "images".to_string(),
                    metrics: vec![
                        MetricDetail::new("uploaded_total", "Total number of uploaded images"),
                        MetricDetail::new("downloaded_total", "Total number of downloaded images"),
                    ],
                },
                MetricDefinition {
                    metric_type: "parser_images".to_string(),
                    metrics: vec![
                        MetricDetail::new("cached_images_total", "Total number of cached images"),
                        MetricDetail::new("empty_images_total", "Total number of sku without images"),
                    ],
                },
            ],
        },
    }
}
