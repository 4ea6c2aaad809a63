use crate::backend::ViewType;
use crate::charts::{ChartBoard, ChartView};
use crate::errors::AppError;
use crate::gateway::{GatewayError, Intercept, WorkerState};
use crate::models::{HealthSummary, Timeline};
use crate::state::AppState;
use crate::stats::summarize;
use crate::upstream::{FetchRequest, ResponseSnapshot, is_hop_by_hop};
use axum::{
    Json,
    body::Body,
    extract::{Query, Request, State},
    http::{HeaderMap, StatusCode, Uri, header::AUTHORIZATION},
    response::Response,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

pub const CACHE_SOURCE_HEADER: &str = "x-cache-source";

const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub summary: HealthSummary,
    pub charts: Vec<ChartView>,
}

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    #[serde(default)]
    pub view: ViewType,
}

#[derive(Debug, Serialize)]
pub struct GatewayStatus {
    pub version: String,
    pub state: WorkerState,
    pub namespaces: Vec<String>,
    pub entries: usize,
}

pub async fn summary(Json(timeline): Json<Timeline>) -> Json<DashboardResponse> {
    Json(build_dashboard(&timeline))
}

pub async fn dashboard(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
    headers: HeaderMap,
) -> Result<Json<DashboardResponse>, AppError> {
    let token =
        bearer_token(&headers).ok_or_else(|| AppError::unauthorized("missing bearer token"))?;
    let backend = state
        .backend
        .as_ref()
        .ok_or_else(|| AppError::unavailable("backend is not configured"))?;

    let timeline = backend.get_my_timeline(token, query.view).await?;
    Ok(Json(build_dashboard(&timeline)))
}

pub async fn gateway_status(State(state): State<AppState>) -> Json<GatewayStatus> {
    Json(status_of(&state).await)
}

/// Retries the shell install after a failed startup install.
pub async fn gateway_install(
    State(state): State<AppState>,
) -> Result<Json<GatewayStatus>, AppError> {
    let gateway = &state.gateway;
    let result = match gateway.install().await {
        Ok(()) => gateway.activate().await.map(|_| ()),
        Err(err) => Err(err),
    };

    match result {
        Ok(()) => Ok(Json(status_of(&state).await)),
        Err(err @ GatewayError::InvalidState { .. }) => Err(AppError {
            status: StatusCode::CONFLICT,
            message: err.to_string(),
        }),
        Err(err) => Err(AppError::bad_gateway(err)),
    }
}

/// Everything that is not an API route goes through the offline gateway.
pub async fn proxy(State(state): State<AppState>, request: Request) -> Result<Response, AppError> {
    let (parts, body) = request.into_parts();
    let url = target_url(&state.upstream_origin, &parts.uri)
        .map_err(|err| AppError::bad_request(format!("invalid request target: {err}")))?;
    let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|err| AppError::bad_request(err.to_string()))?;

    let request = FetchRequest {
        method: parts.method,
        url: url.to_string(),
        headers: parts.headers,
        body,
    };

    let (response, source) = match state.gateway.handle(&request).await {
        Intercept::Respond { response, source } => (response, source.as_str()),
        Intercept::PassThrough => {
            let response = state
                .gateway
                .fetch_direct(&request)
                .await
                .map_err(AppError::bad_gateway)?;
            (response, "pass-through")
        }
    };

    debug!(
        method = %request.method,
        url = %request.url,
        status = response.status,
        source,
        "proxied"
    );
    into_response(response, source)
}

fn build_dashboard(timeline: &Timeline) -> DashboardResponse {
    let mut board = ChartBoard::new();
    board.render_all(timeline);
    let charts = board.views();
    board.clear();

    DashboardResponse {
        summary: summarize(timeline),
        charts,
    }
}

async fn status_of(state: &AppState) -> GatewayStatus {
    let gateway = &state.gateway;
    let storage = gateway.storage();
    GatewayStatus {
        version: gateway.version().to_string(),
        state: gateway.state().await,
        namespaces: storage.keys().await,
        entries: storage.urls(gateway.version()).await.len(),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn target_url(origin: &Url, uri: &Uri) -> Result<Url, url::ParseError> {
    if uri.scheme().is_some() {
        return Url::parse(&uri.to_string());
    }

    // Anchored with `./` so a path that looks like a URL stays on the origin.
    let path = uri.path_and_query().map(|value| value.as_str()).unwrap_or("/");
    origin.join(&format!("./{}", path.trim_start_matches('/')))
}

fn into_response(snapshot: ResponseSnapshot, source: &'static str) -> Result<Response, AppError> {
    let status = StatusCode::from_u16(snapshot.status).map_err(AppError::internal)?;
    let mut builder = Response::builder().status(status);
    for (name, value) in &snapshot.headers {
        if !is_hop_by_hop(name) {
            builder = builder.header(name.as_str(), value.as_str());
        }
    }

    builder
        .header(CACHE_SOURCE_HEADER, source)
        .body(Body::from(snapshot.body))
        .map_err(AppError::internal)
}
