//! Worker HTTP handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use skirmish_core::{CreateGameRequest, GameConfig, GameType, epoch_millis, is_valid_game_id};

use crate::WorkerState;
use crate::error::{WorkerError, WorkerResult};

/// Body of `POST /api/join/{id}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct JoinRequest {
    pub username: String,
}

fn is_admin(state: &WorkerState, headers: &HeaderMap) -> bool {
    headers
        .get(&state.admin_header)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|token| token == state.admin_token.as_ref())
}

/// POST /api/create_game/{id}
pub async fn create_game(
    State(state): State<WorkerState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CreateGameRequest>,
) -> WorkerResult<impl IntoResponse> {
    if !is_valid_game_id(&id) {
        return Err(WorkerError::InvalidId(id));
    }
    if req.game_config.game_type == GameType::Public && !is_admin(&state, &headers) {
        return Err(WorkerError::Unauthorized);
    }
    let info = state.store.create(&id, req.game_config, epoch_millis()).await?;
    Ok(Json(info))
}

/// GET /api/game/{id}
pub async fn get_game(
    State(state): State<WorkerState>,
    Path(id): Path<String>,
) -> WorkerResult<impl IntoResponse> {
    Ok(Json(state.store.get(&id).await?))
}

/// PUT /api/game/{id}
pub async fn update_game(
    State(state): State<WorkerState>,
    Path(id): Path<String>,
    Json(config): Json<GameConfig>,
) -> WorkerResult<impl IntoResponse> {
    Ok(Json(state.store.update_config(&id, config, epoch_millis()).await?))
}

/// POST /api/start_game/{id}
pub async fn start_game(
    State(state): State<WorkerState>,
    Path(id): Path<String>,
) -> WorkerResult<impl IntoResponse> {
    Ok(Json(state.store.start(&id, epoch_millis()).await?))
}

/// POST /api/join/{id}
pub async fn join_game(
    State(state): State<WorkerState>,
    Path(id): Path<String>,
    Json(req): Json<JoinRequest>,
) -> WorkerResult<impl IntoResponse> {
    Ok(Json(state.store.join(&id, &req.username, epoch_millis()).await?))
}
