use std::{collections::HashMap, sync::Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::{PersistentStore, StoreKey};

/// Process-local [PersistentStore]. Nothing survives the process, which makes it suitable for
/// tests and for simulating a restart by handing the same instance to a fresh service.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<StoreKey, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn get(&self, key: StoreKey) -> Result<Option<Value>> {
        let values = self
            .values
            .lock()
            .map_err(|_| anyhow!("Memory store lock poisoned"))?;
        Ok(values.get(&key).cloned())
    }

    async fn set(&self, key: StoreKey, value: Value) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow!("Memory store lock poisoned"))?;
        values.insert(key, value);
        Ok(())
    }
}

#[cfg(test)]
pub use failing::FailingStore;
