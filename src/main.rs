use health_tracker::{
    AppState, CacheStorage, Config, Gateway, backend::BackendClient, router,
    upstream::HttpUpstream,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::fs;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = Config::from_env()?;
    if let Some(parent) = config.data_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let storage = CacheStorage::load(config.data_path.clone()).await;
    let gateway = Gateway::new(config.gateway.clone(), storage, Arc::new(HttpUpstream::new()?));

    // A failed install leaves the gateway passing requests straight through.
    match gateway.install().await {
        Ok(()) => {
            if let Err(err) = gateway.activate().await {
                error!("gateway activation failed: {err}");
            }
        }
        Err(err) => warn!("serving without offline cache: {err}"),
    }

    let backend = match config.backend_url.clone() {
        Some(url) => Some(BackendClient::new(url)?),
        None => {
            warn!("BACKEND_URL is not set, /api/dashboard is disabled");
            None
        }
    };

    let state = AppState::new(config.upstream_origin.clone(), gateway, backend);
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("listening on http://{addr}, proxying {}", config.upstream_origin);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
