//! HTTP/JSON source adapter.
//!
//! Talks to an external scraper endpoint:
//! - `GET {url}/anime/{anime_id}/episodes` returns `{"episodes": [...]}`
//! - `GET {url}/anime/{anime_id}/episodes/{number}/stream?season=&url=`
//!   returns `{"url": "..."}`

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::SourceConfig;

use super::{Episode, EpisodeSource, SourceDescriptor, SourceError};

#[derive(Debug, Deserialize)]
struct EpisodesResponse {
    episodes: Vec<Episode>,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    url: String,
}

/// A source reached over HTTP.
pub struct HttpSource {
    descriptor: SourceDescriptor,
    base_url: String,
    client: Client,
}

impl HttpSource {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| SourceError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            descriptor: SourceDescriptor::new(&config.name, &config.language, config.priority),
            base_url: config.url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn episodes_url(&self, anime_id: &str) -> String {
        format!(
            "{}/anime/{}/episodes",
            self.base_url,
            urlencoding::encode(anime_id)
        )
    }

    fn stream_url(&self, anime_id: &str, episode: &Episode) -> String {
        format!(
            "{}/anime/{}/episodes/{}/stream?season={}&url={}",
            self.base_url,
            urlencoding::encode(anime_id),
            episode.number,
            episode.season,
            urlencoding::encode(&episode.url)
        )
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        debug!(source = %self.descriptor.name, url = %url, "Querying source");

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                SourceError::Timeout
            } else if e.is_connect() {
                SourceError::ConnectionFailed(e.to_string())
            } else {
                SourceError::ApiError(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::ApiError(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| SourceError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl EpisodeSource for HttpSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    async fn fetch_episodes(&self, anime_id: &str) -> Result<Vec<Episode>, SourceError> {
        let response: EpisodesResponse = self.get_json(&self.episodes_url(anime_id)).await?;
        Ok(response.episodes)
    }

    async fn fetch_stream_url(
        &self,
        anime_id: &str,
        episode: &Episode,
    ) -> Result<String, SourceError> {
        let response: StreamResponse = self.get_json(&self.stream_url(anime_id, episode)).await?;
        if response.url.trim().is_empty() {
            return Err(SourceError::InvalidResponse("empty stream url".to_string()));
        }
        Ok(response.url)
    }
}
