//! Debrid passthrough handlers.
//!
//! Every handler answers 503 when no debrid backend is configured.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use streamfinder_core::{DebridError, GatewayError, Quality, TorrentCacheGateway, TorrentCandidate};
use streamfinder_core::debrid::DebridTorrent;
use tracing::info;

use super::error::ApiError;
use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub quality: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub candidates: Vec<TorrentCandidate>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct CheckCachedRequest {
    pub hashes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckCachedResponse {
    pub cached: HashMap<String, bool>,
}

#[derive(Debug, Serialize)]
pub struct TorrentListResponse {
    pub torrents: Vec<DebridTorrent>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct AddMagnetRequest {
    pub magnet: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct LinkResponse {
    pub url: String,
}

fn gateway(state: &AppState) -> Result<&Arc<TorrentCacheGateway>, ApiError> {
    state
        .engine()
        .gateway()
        .ok_or_else(ApiError::fallback_not_configured)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/debrid/search
///
/// Search torrents and rank them, cached on the service first.
pub async fn search(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let gateway = gateway(&state)?;

    let query = request.query.trim();
    if query.is_empty() {
        return Err(ApiError::bad_request("query must not be empty"));
    }
    let quality = match request.quality.as_deref() {
        Some(label) => Some(
            Quality::parse(label)
                .ok_or_else(|| ApiError::bad_request(format!("unknown quality: {}", label)))?,
        ),
        None => None,
    };

    let candidates = gateway.search(query, quality).await?;
    Ok(Json(SearchResponse {
        query: query.to_string(),
        count: candidates.len(),
        candidates,
    }))
}

/// POST /api/v1/debrid/check-cached
pub async fn check_cached(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CheckCachedRequest>,
) -> Result<Json<CheckCachedResponse>, ApiError> {
    let gateway = gateway(&state)?;
    let cached = gateway.check_cached(&request.hashes).await?;
    Ok(Json(CheckCachedResponse { cached }))
}

/// GET /api/v1/debrid/torrents
pub async fn list_torrents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TorrentListResponse>, ApiError> {
    let gateway = gateway(&state)?;
    let torrents = gateway.list_torrents().await?;
    Ok(Json(TorrentListResponse {
        count: torrents.len(),
        torrents,
    }))
}

/// POST /api/v1/debrid/torrents
pub async fn add_torrent(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddMagnetRequest>,
) -> Result<(StatusCode, Json<DebridTorrent>), ApiError> {
    let gateway = gateway(&state)?;

    if !request.magnet.trim().starts_with("magnet:") {
        return Err(ApiError::bad_request("magnet must be a magnet: URI"));
    }

    let torrent = gateway.add_magnet(request.magnet.trim()).await?;
    info!(id = torrent.id, hash = %torrent.hash, "Torrent added via API");
    Ok((StatusCode::CREATED, Json(torrent)))
}

/// DELETE /api/v1/debrid/torrents/{id}
pub async fn delete_torrent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let gateway = gateway(&state)?;
    if !gateway.delete_torrent(id).await? {
        return Err(GatewayError::Debrid(DebridError::TorrentNotFound(id.to_string())).into());
    }
    Ok(Json(DeleteResponse { deleted: true }))
}

/// GET /api/v1/debrid/torrents/{id}/files/{file_id}/link
pub async fn download_link(
    State(state): State<Arc<AppState>>,
    Path((id, file_id)): Path<(u64, u64)>,
) -> Result<Json<LinkResponse>, ApiError> {
    let gateway = gateway(&state)?;
    let url = gateway.download_link(id, file_id).await?;
    Ok(Json(LinkResponse { url }))
}
