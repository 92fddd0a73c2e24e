//! Episode list and stream resolution handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use streamfinder_core::{Episode, StreamRequest, StreamResolution};
use tracing::debug;

use super::error::ApiError;
use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct EpisodesResponse {
    pub anime_id: String,
    /// Source that produced the list.
    pub source: String,
    pub count: usize,
    pub episodes: Vec<Episode>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamParams {
    /// Human title used for the torrent fallback search.
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub quality: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/anime/{anime_id}/episodes
pub async fn get_episodes(
    State(state): State<Arc<AppState>>,
    Path(anime_id): Path<String>,
) -> Result<Json<EpisodesResponse>, ApiError> {
    let list = state.engine().resolve_episodes(&anime_id).await?;

    Ok(Json(EpisodesResponse {
        anime_id: anime_id.trim().to_string(),
        source: list.origin_source().unwrap_or_default().to_string(),
        count: list.len(),
        episodes: list.entries().to_vec(),
    }))
}

/// GET /api/v1/anime/{anime_id}/episodes/{episode_id}/stream
///
/// `episode_id` may be a bare number, `s2e7` / `2x7`, or a URL-encoded
/// episode URL.
pub async fn get_stream(
    State(state): State<Arc<AppState>>,
    Path((anime_id, episode_id)): Path<(String, String)>,
    Query(params): Query<StreamParams>,
) -> Result<Json<StreamResolution>, ApiError> {
    let mut request = StreamRequest::new(anime_id, episode_id);
    request.title = params.title;
    request.quality = params.quality;

    debug!(
        anime_id = %request.anime_id,
        episode_id = %request.episode_id,
        "Resolving stream"
    );
    let resolution = state.engine().resolve_stream_with(&request).await?;
    Ok(Json(resolution))
}
