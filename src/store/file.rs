use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::Result;
use async_trait::async_trait;
use fs4::tokio::AsyncFileExt;
use serde_json::Value;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};
use tracing::{debug, warn};

use super::{PersistentStore, StoreKey};

/// The main realization of [PersistentStore]. Every key is a JSON document in its own file,
/// so a CLI reading the store never sees a half written collection of another key.
pub struct JsonFileStore {
    store_dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(store_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&store_dir)?;

        Ok(Self { store_dir })
    }

    fn path_for(&self, key: StoreKey) -> PathBuf {
        self.store_dir.join(format!("{}.json", key.as_str()))
    }

    async fn read_inner(path: &Path) -> std::result::Result<Option<String>, std::io::Error> {
        let mut file = match File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        file.lock_shared()?;
        let mut content = String::new();
        let result = file.read_to_string(&mut content).await;
        file.unlock_async().await?;
        result?;
        Ok(Some(content))
    }

    async fn write_inner(path: &Path, content: &[u8]) -> std::result::Result<(), std::io::Error> {
        let mut file = File::options()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .await?;

        // Semi-safe acquire-release for a file
        file.lock_exclusive()?;
        let result = async {
            file.set_len(0).await?;
            file.rewind().await?;
            file.write_all(content).await?;
            file.flush().await?;
            file.sync_data().await
        }
        .await;
        file.unlock_async().await?;
        result
    }
}

#[async_trait]
impl PersistentStore for JsonFileStore {
    async fn get(&self, key: StoreKey) -> Result<Option<Value>> {
        let path = self.path_for(key);
        debug!("Reading {key} from {path:?}");
        let Some(content) = Self::read_inner(&path).await? else {
            return Ok(None);
        };
        if content.trim().is_empty() {
            return Ok(None);
        }
        match serde_json::from_str::<Value>(&content) {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                // Might happen if the process was killed in the middle of a write.
                warn!("Stored value for {key} in {path:?} is not valid json: {e}");
                Ok(None)
            }
        }
    }

    async fn set(&self, key: StoreKey, value: Value) -> Result<()> {
        let path = self.path_for(key);
        let content = serde_json::to_vec(&value)?;
        debug!("Writing {} bytes for {key} into {path:?}", content.len());
        Self::write_inner(&path, &content).await?;
        Ok(())
    }
}
