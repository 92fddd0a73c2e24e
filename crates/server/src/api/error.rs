//! Mapping from engine errors to HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use streamfinder_core::{DebridError, GatewayError, ResolveError};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

/// An error ready to be rendered as `{ "error": ..., "kind": ... }`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub kind: &'static str,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: &'static str, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            kind,
        }
    }

    pub fn not_found(kind: &'static str, error: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, kind, error)
    }

    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", error)
    }

    pub fn fallback_not_configured() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "fallback_not_configured",
            "Debrid fallback not configured",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.error,
                kind: self.kind.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        let status = match &err {
            ResolveError::AllSourcesExhausted { .. }
            | ResolveError::NoStreamAvailable { .. }
            | ResolveError::EpisodeNotFound { .. } => StatusCode::NOT_FOUND,
            ResolveError::FallbackNotConfigured | ResolveError::SourceUnavailable { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ResolveError::CacheCorrupt(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ResolveError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ResolveError::SourceTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ResolveError::TorrentSearchFailed(_)
            | ResolveError::TorrentNotCachedAndAddFailed(_)
            | ResolveError::SourceFailed { .. }
            | ResolveError::SourceEmptyResult { .. } => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, err.kind(), err.to_string())
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let (status, kind) = match &err {
            GatewayError::Debrid(DebridError::TorrentNotFound(_)) => {
                (StatusCode::NOT_FOUND, "torrent_not_found")
            }
            GatewayError::NoCandidates(_) => (StatusCode::NOT_FOUND, "no_candidates"),
            GatewayError::Config(_) => (StatusCode::SERVICE_UNAVAILABLE, "fallback_not_configured"),
            GatewayError::Search(_) => (StatusCode::BAD_GATEWAY, "torrent_search_failed"),
            GatewayError::Debrid(_) | GatewayError::NotReady { .. } | GatewayError::NoVideoFile(_) => {
                (StatusCode::BAD_GATEWAY, "debrid_error")
            }
        };
        Self::new(status, kind, err.to_string())
    }
}
