//! Mock episode source for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::source::{Episode, EpisodeSource, SourceDescriptor, SourceError};

/// Mock implementation of the EpisodeSource trait.
///
/// Provides controllable behavior for testing:
/// - Return a configured episode list and stream URL
/// - Fail every call with a configured error until cleared
/// - Delay each call to exercise timeouts and concurrency
/// - Record every call for assertions
///
/// # Example
///
/// ```rust,ignore
/// let source = Arc::new(MockSource::new("allanime", 10));
/// source.set_episodes(fixtures::episodes(1, 12)).await;
///
/// let episodes = source.fetch_episodes("frieren").await?;
/// assert_eq!(episodes.len(), 12);
/// assert_eq!(source.episode_calls().await, vec!["frieren"]);
/// ```
#[derive(Debug)]
pub struct MockSource {
    descriptor: SourceDescriptor,
    /// Episodes returned by `fetch_episodes`.
    episodes: Arc<RwLock<Vec<Episode>>>,
    /// URL returned by `fetch_stream_url`; derived from the episode when unset.
    stream_url: Arc<RwLock<Option<String>>>,
    episode_error: Arc<RwLock<Option<SourceError>>>,
    stream_error: Arc<RwLock<Option<SourceError>>>,
    delay: Arc<RwLock<Option<Duration>>>,
    episode_calls: Arc<RwLock<Vec<String>>>,
    stream_calls: Arc<RwLock<Vec<(String, Episode)>>>,
    /// `fetch_episodes` calls that ran to completion.
    completed: AtomicUsize,
}

impl MockSource {
    pub fn new(name: &str, priority: i32) -> Self {
        Self {
            descriptor: SourceDescriptor::new(name, "en", priority),
            episodes: Arc::new(RwLock::new(Vec::new())),
            stream_url: Arc::new(RwLock::new(None)),
            episode_error: Arc::new(RwLock::new(None)),
            stream_error: Arc::new(RwLock::new(None)),
            delay: Arc::new(RwLock::new(None)),
            episode_calls: Arc::new(RwLock::new(Vec::new())),
            stream_calls: Arc::new(RwLock::new(Vec::new())),
            completed: AtomicUsize::new(0),
        }
    }

    pub async fn set_episodes(&self, episodes: Vec<Episode>) {
        *self.episodes.write().await = episodes;
    }

    pub async fn set_stream_url(&self, url: &str) {
        *self.stream_url.write().await = Some(url.to_string());
    }

    /// Fail every `fetch_episodes` call with this error.
    pub async fn set_episode_error(&self, error: SourceError) {
        *self.episode_error.write().await = Some(error);
    }

    /// Fail every `fetch_stream_url` call with this error.
    pub async fn set_stream_error(&self, error: SourceError) {
        *self.stream_error.write().await = Some(error);
    }

    pub async fn clear_errors(&self) {
        *self.episode_error.write().await = None;
        *self.stream_error.write().await = None;
    }

    /// Sleep this long before answering any call.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    /// Anime ids passed to `fetch_episodes`, in call order.
    pub async fn episode_calls(&self) -> Vec<String> {
        self.episode_calls.read().await.clone()
    }

    /// `(anime_id, episode)` pairs passed to `fetch_stream_url`.
    pub async fn stream_calls(&self) -> Vec<(String, Episode)> {
        self.stream_calls.read().await.clone()
    }

    pub async fn completed_calls(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl EpisodeSource for MockSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    async fn fetch_episodes(&self, anime_id: &str) -> Result<Vec<Episode>, SourceError> {
        self.episode_calls.write().await.push(anime_id.to_string());
        self.wait().await;
        self.completed.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.episode_error.read().await.clone() {
            return Err(error);
        }
        Ok(self.episodes.read().await.clone())
    }

    async fn fetch_stream_url(
        &self,
        anime_id: &str,
        episode: &Episode,
    ) -> Result<String, SourceError> {
        self.stream_calls
            .write()
            .await
            .push((anime_id.to_string(), episode.clone()));
        self.wait().await;

        if let Some(error) = self.stream_error.read().await.clone() {
            return Err(error);
        }
        match self.stream_url.read().await.clone() {
            Some(url) => Ok(url),
            None => Ok(format!(
                "https://{}.example/{}/s{}e{}.m3u8",
                self.descriptor.name, anime_id, episode.season, episode.number
            )),
        }
    }
}
