use crate::handlers;
use crate::state::AppState;
use axum::{routing::{get, post}, Router};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/summary", post(handlers::summary))
        .route("/api/dashboard", get(handlers::dashboard))
        .route("/api/gateway", get(handlers::gateway_status))
        .route("/api/gateway/install", post(handlers::gateway_install))
        .fallback(handlers::proxy)
        .with_state(state)
}
