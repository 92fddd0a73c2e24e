use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{admin, anime, debrid, handlers, middleware::metrics_middleware};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Resolution
        .route("/anime/{anime_id}/episodes", get(anime::get_episodes))
        .route(
            "/anime/{anime_id}/episodes/{episode_id}/stream",
            get(anime::get_stream),
        )
        // Source health and cache
        .route("/stats", get(admin::get_stats))
        .route("/sources/reset", post(admin::reset_sources))
        .route("/sources/{name}/reset", post(admin::reset_source))
        .route("/cache", delete(admin::clear_cache))
        .route("/cache/episodes", delete(admin::clear_episode_cache))
        .route("/cache/anime/{anime_id}", delete(admin::invalidate_anime))
        // Debrid passthrough
        .route("/debrid/search", post(debrid::search))
        .route("/debrid/check-cached", post(debrid::check_cached))
        .route("/debrid/torrents", get(debrid::list_torrents))
        .route("/debrid/torrents", post(debrid::add_torrent))
        .route("/debrid/torrents/{id}", delete(debrid::delete_torrent))
        .route(
            "/debrid/torrents/{id}/files/{file_id}/link",
            get(debrid::download_link),
        );

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::get_metrics))
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
