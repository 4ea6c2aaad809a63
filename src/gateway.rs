use crate::policy::{self, Fallback, Route};
use crate::storage::{CacheStorage, StorageError};
use crate::upstream::{FetchError, FetchRequest, ResponseSnapshot, Upstream};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use url::Url;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Name of the cache namespace. Bump it whenever the shell changes.
    pub version: String,
    pub manifest: Vec<Url>,
    pub backend_hosts: Vec<String>,
    pub offline_page: Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("{url} responded with status {status}")]
    BadStatus { url: String, status: u16 },

    #[error("cache storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("cannot {action} while {state:?}")]
    InvalidState {
        action: &'static str,
        state: WorkerState,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Network,
    Cache,
    OfflinePage,
    Offline,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Network => "network",
            Source::Cache => "cache",
            Source::OfflinePage => "offline-page",
            Source::Offline => "offline",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intercept {
    PassThrough,
    Respond {
        response: ResponseSnapshot,
        source: Source,
    },
}

/// Network-first gateway over one versioned cache namespace.
#[derive(Clone)]
pub struct Gateway {
    config: Arc<GatewayConfig>,
    storage: CacheStorage,
    upstream: Arc<dyn Upstream>,
    state: Arc<RwLock<WorkerState>>,
}

impl Gateway {
    pub fn new(
        config: GatewayConfig,
        storage: CacheStorage,
        upstream: Arc<dyn Upstream>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            storage,
            upstream,
            state: Arc::new(RwLock::new(WorkerState::Parsed)),
        }
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    /// Fetches the whole manifest and stores it under the current version.
    /// Nothing is written unless every entry was fetched successfully.
    pub async fn install(&self) -> Result<(), GatewayError> {
        {
            let mut state = self.state.write().await;
            if !matches!(*state, WorkerState::Parsed | WorkerState::Redundant) {
                return Err(GatewayError::InvalidState {
                    action: "install",
                    state: *state,
                });
            }
            *state = WorkerState::Installing;
        }

        info!(version = %self.config.version, "installing shell");
        match self.precache().await {
            Ok(count) => {
                *self.state.write().await = WorkerState::Installed;
                info!(version = %self.config.version, entries = count, "shell cached");
                Ok(())
            }
            Err(err) => {
                *self.state.write().await = WorkerState::Redundant;
                error!(version = %self.config.version, "shell install failed: {err}");
                Err(err)
            }
        }
    }

    async fn precache(&self) -> Result<usize, GatewayError> {
        let mut fetches = JoinSet::new();
        for url in &self.config.manifest {
            let upstream = Arc::clone(&self.upstream);
            let url = url.to_string();
            fetches.spawn(async move {
                let result = upstream.fetch(&FetchRequest::get(url.clone())).await;
                (url, result)
            });
        }

        let mut entries = Vec::with_capacity(self.config.manifest.len());
        while let Some(joined) = fetches.join_next().await {
            let Ok((url, result)) = joined else {
                continue;
            };
            let response = result.map_err(|source| GatewayError::Fetch {
                url: url.clone(),
                source,
            })?;
            if !response.is_success() {
                return Err(GatewayError::BadStatus {
                    url,
                    status: response.status,
                });
            }
            entries.push((url, response));
        }

        if entries.len() != self.config.manifest.len() {
            return Err(GatewayError::Fetch {
                url: self.config.version.clone(),
                source: FetchError::Unreachable("manifest fetch task aborted".to_string()),
            });
        }

        let count = entries.len();
        self.storage.put_all(&self.config.version, entries).await?;
        Ok(count)
    }

    /// Drops every namespace other than the current version and starts
    /// intercepting requests. Returns the namespaces that were deleted.
    pub async fn activate(&self) -> Result<Vec<String>, GatewayError> {
        {
            let mut state = self.state.write().await;
            if *state != WorkerState::Installed {
                return Err(GatewayError::InvalidState {
                    action: "activate",
                    state: *state,
                });
            }
            *state = WorkerState::Activating;
        }

        match self.purge_stale().await {
            Ok(deleted) => {
                *self.state.write().await = WorkerState::Activated;
                info!(version = %self.config.version, "gateway activated");
                Ok(deleted)
            }
            Err(err) => {
                *self.state.write().await = WorkerState::Installed;
                Err(err)
            }
        }
    }

    async fn purge_stale(&self) -> Result<Vec<String>, GatewayError> {
        let mut deleted = Vec::new();
        for namespace in self.storage.keys().await {
            if namespace == self.config.version {
                continue;
            }
            info!(%namespace, "deleting old cache");
            self.storage.delete(&namespace).await?;
            deleted.push(namespace);
        }
        Ok(deleted)
    }

    pub async fn handle(&self, request: &FetchRequest) -> Intercept {
        if self.state().await != WorkerState::Activated {
            return Intercept::PassThrough;
        }

        let store = match policy::route(&request.url, &request.method, &self.config.backend_hosts) {
            Route::PassThrough => return Intercept::PassThrough,
            Route::NetworkFirst { store } => store,
        };

        match self.upstream.fetch(request).await {
            Ok(response) => {
                if store {
                    self.store_in_background(request.url.clone(), response.clone());
                }
                Intercept::Respond {
                    response,
                    source: Source::Network,
                }
            }
            Err(err) => {
                warn!(url = %request.url, "network failed, serving from cache: {err}");
                self.fallback(request).await
            }
        }
    }

    /// Sends a request the gateway chose not to intercept.
    pub async fn fetch_direct(
        &self,
        request: &FetchRequest,
    ) -> Result<ResponseSnapshot, FetchError> {
        self.upstream.fetch(request).await
    }

    fn store_in_background(&self, url: String, response: ResponseSnapshot) {
        let storage = self.storage.clone();
        let version = self.config.version.clone();
        tokio::spawn(async move {
            if let Err(err) = storage.put(&version, &url, response).await {
                warn!(%url, "failed to cache response: {err}");
            }
        });
    }

    async fn fallback(&self, request: &FetchRequest) -> Intercept {
        let version = &self.config.version;
        if let Some(entry) = self.storage.lookup(version, &request.url).await {
            return Intercept::Respond {
                response: entry.response,
                source: Source::Cache,
            };
        }

        if policy::miss_fallback(&request.headers) == Fallback::OfflinePage {
            let offline_page = self.config.offline_page.as_str();
            if let Some(entry) = self.storage.lookup(version, offline_page).await {
                return Intercept::Respond {
                    response: entry.response,
                    source: Source::OfflinePage,
                };
            }
        }

        Intercept::Respond {
            response: ResponseSnapshot::offline(),
            source: Source::Offline,
        }
    }
}
