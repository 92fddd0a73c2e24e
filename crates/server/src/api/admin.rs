//! Operational handlers: engine stats, circuit resets and cache control.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use streamfinder_core::EngineStats;
use tracing::info;

use super::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct RemovedResponse {
    pub removed: usize,
}

/// GET /api/v1/stats
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<EngineStats> {
    Json(state.engine().get_stats())
}

/// POST /api/v1/sources/reset
///
/// Close every circuit and clear failure counters.
pub async fn reset_sources(State(state): State<Arc<AppState>>) -> Json<SuccessResponse> {
    state.engine().reset_failures();
    info!("All source failures reset via API");
    Json(SuccessResponse {
        message: "All sources reset".to_string(),
    })
}

/// POST /api/v1/sources/{name}/reset
pub async fn reset_source(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    if !state.engine().reset_source(&name) {
        return Err(ApiError::not_found(
            "source_not_found",
            format!("Unknown source: {}", name),
        ));
    }
    info!(source = %name, "Source reset via API");
    Ok(Json(SuccessResponse {
        message: format!("Source {} reset", name),
    }))
}

/// DELETE /api/v1/cache/episodes
///
/// Drop cached episode lists. Cached stream URLs are kept.
pub async fn clear_episode_cache(State(state): State<Arc<AppState>>) -> Json<RemovedResponse> {
    let removed = state.engine().clear_episode_cache();
    info!(removed, "Episode cache cleared via API");
    Json(RemovedResponse { removed })
}

/// DELETE /api/v1/cache
pub async fn clear_cache(State(state): State<Arc<AppState>>) -> Json<SuccessResponse> {
    state.engine().clear_all_cache();
    info!("Resolution cache cleared via API");
    Json(SuccessResponse {
        message: "Cache cleared".to_string(),
    })
}

/// DELETE /api/v1/cache/anime/{anime_id}
pub async fn invalidate_anime(
    State(state): State<Arc<AppState>>,
    Path(anime_id): Path<String>,
) -> Json<RemovedResponse> {
    let removed = state.engine().invalidate_anime(&anime_id);
    Json(RemovedResponse { removed })
}
