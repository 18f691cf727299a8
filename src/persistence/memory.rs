// In-process gateway for local runs without Redis.

use parking_lot::Mutex;
use std::collections::HashMap;

use super::{Gateway, GatewayError};

/// MemoryGateway keeps values for the lifetime of the process only.
#[derive(Default)]
pub struct MemoryGateway {
    data: Mutex<HashMap<String, u64>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl Gateway for MemoryGateway {
    async fn get(&self, key: &str) -> Result<Option<u64>, GatewayError> {
        Ok(self.data.lock().get(key).copied())
    }

    async fn set(&self, key: &str, value: u64) -> Result<(), GatewayError> {
        self.data.lock().insert(key.to_string(), value);
        Ok(())
    }
}
