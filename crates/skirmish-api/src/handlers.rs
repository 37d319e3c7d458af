//! HTTP handlers for the client-facing master API.

use axum::Json;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, EXPIRES, PRAGMA};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tower::ServiceExt;
use tower_http::services::ServeFile;

use skirmish_metrics::{FleetMetrics, render_prometheus};

use crate::{ApiState, SpaState};

/// Body of `GET /api/env`.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct EnvResponse {
    pub game_env: String,
}

// ── Master API ─────────────────────────────────────────────────

/// GET /api/env
pub async fn get_env(State(state): State<ApiState>) -> impl IntoResponse {
    Json(EnvResponse {
        game_env: state.game_env.to_string(),
    })
}

/// GET /api/public_lobbies
///
/// Serves the last published snapshot verbatim.
pub async fn get_public_lobbies(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.lobbies.current();
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "application/json")],
        snapshot.as_str().to_owned(),
    )
}

// ── SPA entry ──────────────────────────────────────────────────

/// Any other path: the SPA entry document, never cached.
pub async fn spa_index(State(spa): State<SpaState>, req: Request<Body>) -> Response {
    let served = ServeFile::new(spa.index.as_path()).oneshot(req).await;
    let mut resp = match served {
        Ok(resp) => resp.into_response(),
        Err(never) => match never {},
    };
    let headers = resp.headers_mut();
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(EXPIRES, HeaderValue::from_static("0"));
    resp
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(metrics): State<FleetMetrics>) -> impl IntoResponse {
    let body = render_prometheus(&metrics.snapshot());
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
