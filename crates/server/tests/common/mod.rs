//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with mock sources and a mock debrid backend, so the full HTTP stack can
//! be exercised without any upstream service.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use streamfinder_core::{
    debrid::GatewaySettings,
    testing::{MockDebridService, MockSource, MockTorrentSearcher},
    Config, Engine, EpisodeSource, SourceRegistry, TorrentCacheGateway, TorrentSearcher,
};

/// Re-export fixtures for test convenience
pub use streamfinder_core::testing::fixtures;

/// Test fixture for API testing with mock dependencies.
///
/// Provides an in-process server with fully controllable mocks for:
/// - Episode sources (MockSource, one per configured name)
/// - Torrent search (MockTorrentSearcher)
/// - Debrid service (MockDebridService)
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_episodes() {
///     let fixture = TestFixture::new().await;
///     fixture.source("allanime").set_episodes(fixtures::episodes(1, 12)).await;
///
///     let response = fixture.get("/api/v1/anime/frieren/episodes").await;
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock sources, in the order they were configured
    pub sources: Vec<Arc<MockSource>>,
    /// Mock debrid service - control cached hashes and torrents
    pub debrid: Arc<MockDebridService>,
    /// Mock torrent searcher - configure search results
    pub searcher: Arc<MockTorrentSearcher>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    /// Raw body, for non-JSON endpoints.
    pub text: String,
}

/// Configuration for test fixture.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// `(name, priority)` of each mock source
    pub sources: Vec<(String, i32)>,
    /// Wire the mock debrid gateway into the engine
    pub enable_debrid: bool,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            sources: vec![("allanime".to_string(), 10), ("gogo".to_string(), 5)],
            enable_debrid: true,
        }
    }
}

impl TestFixture {
    /// Create a new test fixture with default mocks.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let sources: Vec<_> = test_config
            .sources
            .iter()
            .map(|(name, priority)| Arc::new(MockSource::new(name, *priority)))
            .collect();

        let mut registry = SourceRegistry::new();
        for source in &sources {
            registry
                .register(source.clone())
                .expect("Failed to register source");
        }

        let debrid = Arc::new(MockDebridService::new());
        let searcher = Arc::new(MockTorrentSearcher::new());

        let config = Config::default();
        let mut builder = Engine::builder().config(config.clone()).registry(registry);
        if test_config.enable_debrid {
            builder = builder.gateway(Arc::new(TorrentCacheGateway::new(
                debrid.clone(),
                vec![searcher.clone() as Arc<dyn TorrentSearcher>],
                GatewaySettings::default(),
            )));
        }

        let state = Arc::new(streamfinder_server::state::AppState::new(
            config,
            builder.build(),
        ));
        let router = streamfinder_server::api::create_router(state);

        Self {
            router,
            sources,
            debrid,
            searcher,
        }
    }

    /// Mock source by name.
    pub fn source(&self, name: &str) -> &Arc<MockSource> {
        self.sources
            .iter()
            .find(|s| s.name() == name)
            .expect("Unknown mock source")
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).into_owned();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body, text }
    }
}
