//! TorBox debrid service client.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::config::TorBoxConfig;

use super::rate_limiter::RateLimiter;
use super::{DebridError, DebridService, DebridTorrent};

/// Every TorBox response is wrapped in this envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    error: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct CreateTorrentData {
    torrent_id: u64,
}

/// Unwrap the envelope, turning `success = false` into an error.
fn parse_envelope<T: DeserializeOwned>(body: &str) -> Result<Option<T>, DebridError> {
    let envelope: Envelope<T> = serde_json::from_str(body).map_err(|e| {
        DebridError::InvalidResponse(format!(
            "{}: {}",
            e,
            body.chars().take(200).collect::<String>()
        ))
    })?;

    if !envelope.success {
        let error = envelope.error.unwrap_or_default();
        let detail = envelope.detail.unwrap_or_default();
        if error.contains("NOT_FOUND") || detail.to_lowercase().contains("not found") {
            return Err(DebridError::TorrentNotFound(detail));
        }
        if error.contains("AUTH") || error.contains("BAD_TOKEN") {
            return Err(DebridError::AuthenticationFailed(detail));
        }
        return Err(DebridError::ApiError(format!("{} - {}", error, detail)));
    }

    Ok(envelope.data)
}

/// Interpret a `checkcached?format=object` payload.
///
/// The service returns an object keyed by hash for the cached ones (or
/// `null` when none are); every requested hash gets an entry.
fn parse_cached_map(
    requested: &[String],
    data: Option<HashMap<String, serde_json::Value>>,
) -> HashMap<String, bool> {
    let data: HashMap<String, bool> = data
        .unwrap_or_default()
        .into_iter()
        .map(|(hash, value)| {
            let cached = !matches!(value, serde_json::Value::Null | serde_json::Value::Bool(false));
            (hash.to_lowercase(), cached)
        })
        .collect();

    requested
        .iter()
        .map(|hash| {
            let hash = hash.to_lowercase();
            let cached = data.get(&hash).copied().unwrap_or(false);
            (hash, cached)
        })
        .collect()
}

/// TorBox API client.
pub struct TorBoxClient {
    client: Client,
    base_url: String,
    api_key: String,
    limiter: Option<RateLimiter>,
}

impl TorBoxClient {
    pub fn new(config: &TorBoxConfig) -> Result<Self, DebridError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| DebridError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            limiter: RateLimiter::per_minute("torbox", config.rate_limit_rpm),
        })
    }

    /// Wait for the request budget, if one is configured.
    async fn pace(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/api/{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        operation: &str,
    ) -> Result<Option<T>, DebridError> {
        self.pace().await;
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DebridError::Timeout
                } else if e.is_connect() {
                    DebridError::ConnectionFailed(e.to_string())
                } else {
                    DebridError::ApiError(e.to_string())
                }
            })?;

        let status = response.status();
        debug!(operation = operation, status = %status, "TorBox request");

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(DebridError::AuthenticationFailed(format!("HTTP {}", status)));
        }

        let body = response.text().await.unwrap_or_default();
        // error responses still carry the envelope
        match parse_envelope(&body) {
            Err(DebridError::InvalidResponse(_)) if !status.is_success() => {
                Err(DebridError::ApiError(format!(
                    "HTTP {}: {}",
                    status,
                    body.chars().take(200).collect::<String>()
                )))
            }
            other => other,
        }
    }

    async fn require<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        operation: &str,
    ) -> Result<T, DebridError> {
        self.send(request, operation).await?.ok_or_else(|| {
            DebridError::InvalidResponse(format!("{}: response carried no data", operation))
        })
    }
}

#[async_trait]
impl DebridService for TorBoxClient {
    fn name(&self) -> &str {
        "torbox"
    }

    async fn check_cached(&self, hashes: &[String]) -> Result<HashMap<String, bool>, DebridError> {
        if hashes.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!(
            "{}?hash={}&format=object",
            self.endpoint("torrents/checkcached"),
            urlencoding::encode(&hashes.join(","))
        );
        let data: Option<HashMap<String, serde_json::Value>> =
            self.send(self.client.get(&url), "checkcached").await?;

        Ok(parse_cached_map(hashes, data))
    }

    async fn add_magnet(&self, magnet: &str) -> Result<DebridTorrent, DebridError> {
        let form = multipart::Form::new()
            .text("magnet", magnet.to_string())
            .text("seed", "1")
            .text("allow_zip", "false");

        let created: CreateTorrentData = self
            .require(
                self.client
                    .post(self.endpoint("torrents/createtorrent"))
                    .multipart(form),
                "createtorrent",
            )
            .await?;

        self.get_torrent(created.torrent_id).await
    }

    async fn get_torrent(&self, id: u64) -> Result<DebridTorrent, DebridError> {
        let url = format!(
            "{}?id={}&bypass_cache=true",
            self.endpoint("torrents/mylist"),
            id
        );
        match self.send(self.client.get(&url), "mylist").await? {
            Some(torrent) => Ok(torrent),
            None => Err(DebridError::TorrentNotFound(id.to_string())),
        }
    }

    async fn list_torrents(&self) -> Result<Vec<DebridTorrent>, DebridError> {
        let url = format!("{}?bypass_cache=true", self.endpoint("torrents/mylist"));
        let torrents: Option<Vec<DebridTorrent>> = self.send(self.client.get(&url), "mylist").await?;
        Ok(torrents.unwrap_or_default())
    }

    async fn delete_torrent(&self, id: u64) -> Result<bool, DebridError> {
        let body = serde_json::json!({ "torrent_id": id, "operation": "delete" });
        let result: Result<Option<serde_json::Value>, _> = self
            .send(
                self.client
                    .post(self.endpoint("torrents/controltorrent"))
                    .json(&body),
                "controltorrent",
            )
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(DebridError::TorrentNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn download_link(&self, torrent_id: u64, file_id: u64) -> Result<String, DebridError> {
        let url = format!(
            "{}?token={}&torrent_id={}&file_id={}",
            self.endpoint("torrents/requestdl"),
            urlencoding::encode(&self.api_key),
            torrent_id,
            file_id
        );
        let link: String = self.require(self.client.get(&url), "requestdl").await?;
        if link.trim().is_empty() {
            return Err(DebridError::InvalidResponse("empty download link".to_string()));
        }
        Ok(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> TorBoxConfig {
        TorBoxConfig {
            url: url.to_string(),
            api_key: "key".to_string(),
            timeout_secs: 2,
            rate_limit_rpm: 0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_are_paced_by_rate_limit() {
        let client = TorBoxClient::new(&TorBoxConfig {
            rate_limit_rpm: 3,
            ..config("https://api.torbox.app")
        })
        .unwrap();
        let started = tokio::time::Instant::now();

        for _ in 0..3 {
            client.pace().await;
        }
        assert!(started.elapsed() < Duration::from_secs(1));

        // 3 rpm: the fourth request waits ~20s for a token
        client.pace().await;
        assert!(started.elapsed() >= Duration::from_secs(20));

        let unlimited = TorBoxClient::new(&config("https://api.torbox.app")).unwrap();
        assert!(unlimited.limiter.is_none());
    }

    #[test]
    fn test_endpoint_building() {
        let client = TorBoxClient::new(&config("https://api.torbox.app/")).unwrap();
        assert_eq!(
            client.endpoint("torrents/mylist"),
            "https://api.torbox.app/v1/api/torrents/mylist"
        );
    }

    #[test]
    fn test_parse_envelope_success() {
        let body = r#"{"success": true, "detail": "ok", "data": {"torrent_id": 42, "hash": "abc"}}"#;
        let data: CreateTorrentData = parse_envelope(body).unwrap().unwrap();
        assert_eq!(data.torrent_id, 42);
    }

    #[test]
    fn test_parse_envelope_failure() {
        let body = r#"{"success": false, "error": "DOWNLOAD_SERVER_ERROR", "detail": "boom", "data": null}"#;
        let err = parse_envelope::<serde_json::Value>(body).unwrap_err();
        assert!(matches!(err, DebridError::ApiError(ref msg) if msg.contains("boom")));

        let body = r#"{"success": false, "error": "BAD_TOKEN", "detail": "invalid api key"}"#;
        let err = parse_envelope::<serde_json::Value>(body).unwrap_err();
        assert!(matches!(err, DebridError::AuthenticationFailed(_)));

        let body = r#"{"success": false, "error": "ITEM_NOT_FOUND", "detail": "Torrent not found"}"#;
        let err = parse_envelope::<serde_json::Value>(body).unwrap_err();
        assert!(matches!(err, DebridError::TorrentNotFound(_)));
    }

    #[test]
    fn test_parse_envelope_garbage() {
        let err = parse_envelope::<serde_json::Value>("<html>").unwrap_err();
        assert!(matches!(err, DebridError::InvalidResponse(_)));
    }

    #[test]
    fn test_parse_torrent_payload() {
        let body = r#"{
            "success": true,
            "data": {
                "id": 7,
                "hash": "abc",
                "name": "[SubsPlease] Frieren - 01 (1080p)",
                "size": 1400000000,
                "progress": 1.0,
                "download_state": "cached",
                "download_finished": true,
                "seeds": 12,
                "files": [
                    {"id": 0, "name": "Frieren - 01 (1080p).mkv", "size": 1400000000, "mimetype": "video/x-matroska"}
                ]
            }
        }"#;
        let torrent: DebridTorrent = parse_envelope(body).unwrap().unwrap();
        assert_eq!(torrent.id, 7);
        assert!(torrent.is_ready());
        assert_eq!(torrent.video_files().len(), 1);
    }

    #[test]
    fn test_parse_cached_map() {
        let requested = vec!["AAA".to_string(), "bbb".to_string(), "ccc".to_string()];
        let data: HashMap<String, serde_json::Value> = serde_json::from_str(
            r#"{"aaa": {"name": "x", "size": 1, "hash": "aaa"}, "ccc": false}"#,
        )
        .unwrap();

        let cached = parse_cached_map(&requested, Some(data));
        assert_eq!(cached.len(), 3);
        assert_eq!(cached.get("aaa"), Some(&true));
        assert_eq!(cached.get("bbb"), Some(&false));
        assert_eq!(cached.get("ccc"), Some(&false));

        let none_cached = parse_cached_map(&requested, None);
        assert!(none_cached.values().all(|c| !c));
    }

    #[tokio::test]
    async fn test_check_cached_empty_short_circuits() {
        let client = TorBoxClient::new(&config("http://127.0.0.1:1")).unwrap();
        let result = client.check_cached(&[]).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_service_fails() {
        let client = TorBoxClient::new(&config("http://127.0.0.1:1")).unwrap();
        let err = client.list_torrents().await.unwrap_err();
        assert!(matches!(
            err,
            DebridError::ConnectionFailed(_) | DebridError::Timeout | DebridError::ApiError(_)
        ));
    }
}
