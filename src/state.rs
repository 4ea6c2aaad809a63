use crate::backend::BackendClient;
use crate::gateway::Gateway;
use std::sync::Arc;
use url::Url;

#[derive(Clone)]
pub struct AppState {
    pub upstream_origin: Arc<Url>,
    pub gateway: Gateway,
    pub backend: Option<BackendClient>,
}

impl AppState {
    pub fn new(upstream_origin: Url, gateway: Gateway, backend: Option<BackendClient>) -> Self {
        Self {
            upstream_origin: Arc::new(upstream_origin),
            gateway,
            backend,
        }
    }
}
