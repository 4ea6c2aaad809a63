use crate::upstream::ResponseSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path, path::PathBuf, sync::Arc};
use thiserror::Error;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cache namespace {0} does not exist")]
    MissingNamespace(String),

    #[error("failed to encode cache: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to write cache file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub response: ResponseSnapshot,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheData {
    pub namespaces: BTreeMap<String, BTreeMap<String, CacheEntry>>,
}

/// Versioned key-value cache of responses, keyed by namespace then by request
/// URL. Every mutation is written through to the backing JSON file; writes
/// are serialized, and a mutation whose write fails is undone in memory.
#[derive(Clone)]
pub struct CacheStorage {
    path: Option<PathBuf>,
    data: Arc<RwLock<CacheData>>,
    write_lock: Arc<Mutex<()>>,
}

impl CacheStorage {
    pub fn in_memory() -> Self {
        Self::with_data(None, CacheData::default())
    }

    pub async fn load(path: PathBuf) -> Self {
        let data = load_data(&path).await;
        Self::with_data(Some(path), data)
    }

    fn with_data(path: Option<PathBuf>, data: CacheData) -> Self {
        Self {
            path,
            data: Arc::new(RwLock::new(data)),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn keys(&self) -> Vec<String> {
        self.data.read().await.namespaces.keys().cloned().collect()
    }

    pub async fn contains(&self, namespace: &str) -> bool {
        self.data.read().await.namespaces.contains_key(namespace)
    }

    pub async fn urls(&self, namespace: &str) -> Vec<String> {
        self.data
            .read()
            .await
            .namespaces
            .get(namespace)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn lookup(&self, namespace: &str, url: &str) -> Option<CacheEntry> {
        self.data
            .read()
            .await
            .namespaces
            .get(namespace)
            .and_then(|entries| entries.get(url))
            .cloned()
    }

    /// Opens `namespace`, creating it when it does not exist yet.
    pub async fn open(&self, namespace: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        {
            let mut data = self.data.write().await;
            if data.namespaces.contains_key(namespace) {
                return Ok(());
            }
            data.namespaces.insert(namespace.to_string(), BTreeMap::new());
        }

        if let Err(err) = self.persist().await {
            self.data.write().await.namespaces.remove(namespace);
            return Err(err);
        }
        Ok(())
    }

    pub async fn put(
        &self,
        namespace: &str,
        url: &str,
        response: ResponseSnapshot,
    ) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let previous = {
            let mut data = self.data.write().await;
            let entries = data
                .namespaces
                .get_mut(namespace)
                .ok_or_else(|| StorageError::MissingNamespace(namespace.to_string()))?;
            entries.insert(
                url.to_string(),
                CacheEntry {
                    response,
                    stored_at: Utc::now(),
                },
            )
        };

        if let Err(err) = self.persist().await {
            let mut data = self.data.write().await;
            if let Some(entries) = data.namespaces.get_mut(namespace) {
                match previous {
                    Some(previous) => {
                        entries.insert(url.to_string(), previous);
                    }
                    None => {
                        entries.remove(url);
                    }
                }
            }
            return Err(err);
        }
        Ok(())
    }

    /// Replaces the contents of `namespace` with `entries` in one step. If the
    /// result cannot be persisted the namespace is restored to what it held
    /// before.
    pub async fn put_all(
        &self,
        namespace: &str,
        entries: Vec<(String, ResponseSnapshot)>,
    ) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let stored_at = Utc::now();
        let batch: BTreeMap<String, CacheEntry> = entries
            .into_iter()
            .map(|(url, response)| (url, CacheEntry { response, stored_at }))
            .collect();

        let previous = self
            .data
            .write()
            .await
            .namespaces
            .insert(namespace.to_string(), batch);

        if let Err(err) = self.persist().await {
            let mut data = self.data.write().await;
            match previous {
                Some(previous) => {
                    data.namespaces.insert(namespace.to_string(), previous);
                }
                None => {
                    data.namespaces.remove(namespace);
                }
            }
            return Err(err);
        }
        Ok(())
    }

    pub async fn delete(&self, namespace: &str) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().await;
        let Some(removed) = self.data.write().await.namespaces.remove(namespace) else {
            return Ok(false);
        };

        if let Err(err) = self.persist().await {
            self.data
                .write()
                .await
                .namespaces
                .insert(namespace.to_string(), removed);
            return Err(err);
        }
        Ok(true)
    }

    // Callers must hold `write_lock`.
    async fn persist(&self) -> Result<(), StorageError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let payload = {
            let data = self.data.read().await;
            serde_json::to_vec(&*data)?
        };
        fs::write(path, payload).await?;
        Ok(())
    }
}

async fn load_data(path: &Path) -> CacheData {
    match fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(data) => data,
            Err(err) => {
                error!("failed to parse cache file: {err}");
                CacheData::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => CacheData::default(),
        Err(err) => {
            error!("failed to read cache file: {err}");
            CacheData::default()
        }
    }
}
