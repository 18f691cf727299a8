// Common test utilities.

use std::sync::Arc;
use std::time::Duration;

use crate::counters::{CounterStore, MetricDefinition, MetricDetail, MetricRegistry};
use crate::persistence::Gateway;

use super::FlakyGateway;

/// Definitions used by most tests: `images` with two keys.
pub fn images_definitions() -> Vec<MetricDefinition> {
    vec![MetricDefinition {
        metric_type: "images".to_string(),
        metrics: vec![
            MetricDetail::new("uploaded_total", "Total number of uploaded images"),
            MetricDetail::new("downloaded_total", "Total number of downloaded images"),
        ],
    }]
}

/// Builds a store on top of a fresh flaky gateway.
pub fn new_store(definitions: Vec<MetricDefinition>) -> (Arc<CounterStore>, Arc<FlakyGateway>) {
    let gateway = Arc::new(FlakyGateway::new());
    let store = new_store_with(definitions, gateway.clone());
    (store, gateway)
}

/// Builds a store on top of the given gateway.
pub fn new_store_with(definitions: Vec<MetricDefinition>, gateway: Arc<dyn Gateway>) -> Arc<CounterStore> {
    let registry = Arc::new(MetricRegistry::new());
    Arc::new(CounterStore::new(definitions, registry, gateway).expect("valid definitions"))
}

/// Makes an HTTP request.
pub async fn do_request(
    method: &str,
    url: &str,
    body: Option<serde_json::Value>,
) -> Result<reqwest::Response, reqwest::Error> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let mut request = match method {
        "GET" => client.get(url),
        "POST" => client.post(url),
        "DELETE" => client.delete(url),
        _ => panic!("unsupported method: {}", method),
    };

    if let Some(body) = body {
        request = request.json(&body);
    }

    request.send().await
}

/// Makes an HTTP request and parses the JSON response.
pub async fn do_json(
    method: &str,
    url: &str,
    body: Option<serde_json::Value>,
) -> (u16, serde_json::Value) {
    let resp = do_request(method, url, body).await.expect("request failed");
    let status = resp.status().as_u16();
    let json = resp
        .json::<serde_json::Value>()
        .await
        .unwrap_or(serde_json::Value::Null);
    (status, json)
}
