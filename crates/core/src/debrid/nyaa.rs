//! Nyaa RSS search backend.

use std::time::Duration;

use async_trait::async_trait;
use regex_lite::Regex;
use reqwest::Client;
use tracing::debug;

use crate::config::NyaaConfig;

use super::rate_limiter::RateLimiter;
use super::selection::hash_from_magnet;
use super::{Quality, SearchError, TorrentCandidate, TorrentSearcher};

/// Searches nyaa.si (or a mirror) through its RSS feed, sorted by seeders.
pub struct NyaaSearcher {
    name: String,
    base_url: String,
    client: Client,
    config: NyaaConfig,
    limiter: Option<RateLimiter>,
}

impl NyaaSearcher {
    /// Searcher for the primary `url`, named `nyaa`.
    pub fn new(config: NyaaConfig) -> Result<Self, SearchError> {
        let url = config.url.clone();
        Self::for_host("nyaa", &url, config)
    }

    /// The primary searcher followed by one per configured mirror. Mirrors
    /// are named after their host.
    pub fn with_mirrors(config: NyaaConfig) -> Result<Vec<Self>, SearchError> {
        let mut searchers = vec![Self::new(config.clone())?];
        for mirror in &config.mirrors {
            searchers.push(Self::for_host(&mirror_name(mirror), mirror, config.clone())?);
        }
        Ok(searchers)
    }

    fn for_host(name: &str, base_url: &str, config: NyaaConfig) -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| SearchError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            limiter: RateLimiter::per_minute(name, config.rate_limit_rpm),
            config,
        })
    }

    async fn pace(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }
    }

    fn build_search_url(&self, query: &str) -> String {
        format!(
            "{}/?page=rss&f=0&c={}&q={}&s=seeders&o=desc",
            self.base_url,
            urlencoding::encode(&self.config.category),
            urlencoding::encode(query)
        )
    }
}

#[async_trait]
impl TorrentSearcher for NyaaSearcher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &str) -> Result<Vec<TorrentCandidate>, SearchError> {
        self.pace().await;
        let url = self.build_search_url(query);
        debug!(searcher = %self.name, query = %query, "Searching Nyaa");

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                SearchError::Timeout
            } else if e.is_connect() {
                SearchError::ConnectionFailed(e.to_string())
            } else {
                SearchError::ApiError(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::ApiError(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SearchError::ApiError(format!("Failed to read response: {}", e)))?;

        let results = parse_rss(&body, self.name())?;
        debug!(searcher = %self.name, query = %query, results = results.len(), "Nyaa search complete");
        Ok(results)
    }
}

fn mirror_name(url: &str) -> String {
    let host = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url);
    host.split('/').next().unwrap_or(host).to_lowercase()
}

/// Parse a Nyaa RSS document into candidates.
///
/// Items without an info hash are skipped.
pub fn parse_rss(xml: &str, source: &str) -> Result<Vec<TorrentCandidate>, SearchError> {
    let item_re = Regex::new(r"(?s)<item>(.*?)</item>")
        .map_err(|e| SearchError::ParseError(e.to_string()))?;

    let mut results = Vec::new();
    for caps in item_re.captures_iter(xml) {
        let item = &caps[1];

        let title = match tag_text(item, "title") {
            Some(title) => title,
            None => continue,
        };

        let hash = tag_text(item, "nyaa:infoHash")
            .map(|h| h.to_lowercase())
            .or_else(|| tag_text(item, "link").and_then(|l| hash_from_magnet(&l)));
        let hash = match hash {
            Some(hash) if !hash.is_empty() => hash,
            _ => continue,
        };

        let seeders = tag_text(item, "nyaa:seeders")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let leechers = tag_text(item, "nyaa:leechers")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let size = tag_text(item, "nyaa:size")
            .and_then(|s| parse_size(&s))
            .unwrap_or(0);

        results.push(TorrentCandidate {
            magnet: format!(
                "magnet:?xt=urn:btih:{}&dn={}",
                hash,
                urlencoding::encode(&title)
            ),
            quality: Quality::detect(&title),
            title,
            hash,
            size,
            seeders,
            leechers,
            is_cached_on_debrid_service: false,
            source: source.to_string(),
        });
    }

    Ok(results)
}

/// Text content of the first `<tag>` in `item`, CDATA unwrapped and entities decoded.
fn tag_text(item: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = item.find(&open)? + open.len();
    let end = start + item[start..].find(&close)?;
    let raw = item[start..end].trim();

    let raw = raw
        .strip_prefix("<![CDATA[")
        .and_then(|r| r.strip_suffix("]]>"))
        .unwrap_or(raw);

    let text = raw
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&");
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Parse a human size such as `1.4 GiB` into bytes.
pub fn parse_size(input: &str) -> Option<u64> {
    let mut parts = input.split_whitespace();
    let value: f64 = parts.next()?.parse().ok()?;
    let multiplier: f64 = match parts.next().unwrap_or("B").to_lowercase().as_str() {
        "b" | "bytes" => 1.0,
        "kib" | "kb" => 1024.0,
        "mib" | "mb" => 1024.0 * 1024.0,
        "gib" | "gb" => 1024.0 * 1024.0 * 1024.0,
        "tib" | "tb" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    Some((value * multiplier) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss xmlns:atom="http://www.w3.org/2005/Atom" xmlns:nyaa="https://nyaa.si/xmlns/nyaa" version="2.0">
  <channel>
    <title>Nyaa - "frieren 01" - Torrent File RSS</title>
    <item>
      <title>[SubsPlease] Sousou no Frieren - 01 (1080p) [F02B9CEE].mkv</title>
      <link>https://nyaa.si/download/1.torrent</link>
      <nyaa:seeders>812</nyaa:seeders>
      <nyaa:leechers>12</nyaa:leechers>
      <nyaa:infoHash>3B6F0CE8E8DA1C1A9B1C7E0A7E8A5F4D3C2B1A09</nyaa:infoHash>
      <nyaa:size>1.4 GiB</nyaa:size>
    </item>
    <item>
      <title>[Erai-raws] Sousou no Frieren - 01 [720p] &amp; extras</title>
      <link>https://nyaa.si/download/2.torrent</link>
      <nyaa:seeders>40</nyaa:seeders>
      <nyaa:leechers>3</nyaa:leechers>
      <nyaa:infoHash>aaaabbbbccccddddeeeeffff0000111122223333</nyaa:infoHash>
      <nyaa:size>700.5 MiB</nyaa:size>
    </item>
    <item>
      <title>No hash here</title>
      <nyaa:seeders>1</nyaa:seeders>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_rss() {
        let results = parse_rss(SAMPLE_RSS, "nyaa").unwrap();
        assert_eq!(results.len(), 2);

        let first = &results[0];
        assert_eq!(first.hash, "3b6f0ce8e8da1c1a9b1c7e0a7e8a5f4d3c2b1a09");
        assert_eq!(first.seeders, 812);
        assert_eq!(first.leechers, 12);
        assert_eq!(first.quality, Quality::Fhd1080);
        assert_eq!(first.source, "nyaa");
        assert!(first.magnet.starts_with("magnet:?xt=urn:btih:3b6f0ce8"));
        assert!(!first.is_cached_on_debrid_service);
        assert_eq!(first.size, (1.4 * 1024.0 * 1024.0 * 1024.0) as u64);

        let second = &results[1];
        assert_eq!(second.title, "[Erai-raws] Sousou no Frieren - 01 [720p] & extras");
        assert_eq!(second.quality, Quality::Hd720);
    }

    #[test]
    fn test_parse_rss_empty_feed() {
        let results = parse_rss("<rss><channel></channel></rss>", "nyaa").unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_tag_text_cdata() {
        let item = "<title><![CDATA[Frieren & Fern]]></title>";
        assert_eq!(tag_text(item, "title").as_deref(), Some("Frieren & Fern"));
        assert_eq!(tag_text(item, "link"), None);
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1 KiB"), Some(1024));
        assert_eq!(parse_size("2 MiB"), Some(2 * 1024 * 1024));
        assert_eq!(parse_size("512"), Some(512));
        assert_eq!(parse_size("1 parsec"), None);
        assert_eq!(parse_size(""), None);
    }

    #[test]
    fn test_build_search_url() {
        let searcher = NyaaSearcher::new(NyaaConfig::default()).unwrap();
        assert_eq!(
            searcher.build_search_url("Frieren 01 1080p"),
            "https://nyaa.si/?page=rss&f=0&c=1_2&q=Frieren%2001%201080p&s=seeders&o=desc"
        );
    }

    #[test]
    fn test_mirrors_get_their_own_searcher() {
        let config = NyaaConfig {
            mirrors: vec!["https://nyaa.land/".to_string(), "nyaa.example.org/rss".to_string()],
            ..NyaaConfig::default()
        };
        let searchers = NyaaSearcher::with_mirrors(config).unwrap();
        let names: Vec<_> = searchers.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["nyaa", "nyaa.land", "nyaa.example.org"]);
        assert!(searchers[1]
            .build_search_url("Frieren")
            .starts_with("https://nyaa.land/?page=rss"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_pacing_follows_rate_limit() {
        let searcher = NyaaSearcher::new(NyaaConfig {
            rate_limit_rpm: 6,
            ..NyaaConfig::default()
        })
        .unwrap();
        let started = tokio::time::Instant::now();

        for _ in 0..6 {
            searcher.pace().await;
        }
        assert!(started.elapsed() < Duration::from_secs(1));

        // 6 rpm: one token every 10s
        searcher.pace().await;
        searcher.pace().await;
        assert!(started.elapsed() >= Duration::from_secs(20));

        let unlimited = NyaaSearcher::new(NyaaConfig {
            rate_limit_rpm: 0,
            ..NyaaConfig::default()
        })
        .unwrap();
        assert!(unlimited.limiter.is_none());
    }
}
