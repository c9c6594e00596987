//! Common test utilities for E2E tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;

use feedbridge::data::Consumer;
use feedbridge::{AppState, config};
use serde_json::{Value, json};
use sqlx::types::Json;
use tempfile::TempDir;
use tokio::net::TcpListener;
use wiremock::MockServer;

/// Token with every permission
pub const ADMIN_TOKEN: &str = "admin-token-0123456789abcdef";
/// Token allowed to create and update articles, but not delete them
pub const WRITER_TOKEN: &str = "writer-token-0123456789abcdef";
/// Valid token without permissions
pub const READER_TOKEN: &str = "reader-token-0123456789abcdef";

pub const ARTICLE_MODEL: &str = "api::infocenter-article.infocenter-article";

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
    /// Upstream image host
    pub image_host: MockServer,
}

fn test_config(db_path: std::path::PathBuf, image_host: &MockServer) -> config::AppConfig {
    let all_permissions = [
        "feed.add_article",
        "feed.change_article",
        "feed.delete_article",
        "feed.view_consumer",
        "feed.add_consumer",
        "feed.change_consumer",
        "feed.delete_consumer",
    ];

    config::AppConfig {
        server: config::ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0, // Let OS assign port
            domain: "feeds.test.example.com".to_string(),
            protocol: "https".to_string(),
        },
        database: config::DatabaseConfig { path: db_path },
        auth: config::AuthConfig {
            tokens: vec![
                config::TokenConfig {
                    name: "admin".to_string(),
                    token: ADMIN_TOKEN.to_string(),
                    permissions: all_permissions.iter().map(|p| p.to_string()).collect(),
                },
                config::TokenConfig {
                    name: "writer".to_string(),
                    token: WRITER_TOKEN.to_string(),
                    permissions: vec![
                        "feed.add_article".to_string(),
                        "feed.change_article".to_string(),
                    ],
                },
                config::TokenConfig {
                    name: "reader".to_string(),
                    token: READER_TOKEN.to_string(),
                    permissions: Vec::new(),
                },
            ],
        },
        feed: config::FeedConfig {
            article: config::ArticleFeedConfig {
                title: "Article".to_string(),
                description: "University news".to_string(),
                copyright: "Example University".to_string(),
                url: "https://www.example.org/".to_string(),
                items: 20,
                item_url: "https://app.example.org/article".to_string(),
                image_url: image_host.uri(),
                image_headers: HashMap::from([(
                    "Authorization".to_string(),
                    "Bearer cms-media".to_string(),
                )]),
                roles: Vec::new(),
            },
            image_timeout_seconds: 2,
        },
        cache: config::CacheConfig {
            image_ttl: 3600,
            image_response_ttl: 60,
            feed_ttl: 1,
        },
        logging: config::LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
    }
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server after adjusting the default test configuration
    pub async fn with_config(adjust: impl FnOnce(&mut config::AppConfig)) -> Self {
        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let image_host = MockServer::start().await;

        let mut config = test_config(db_path, &image_host);
        adjust(&mut config);
        config.validate().unwrap();

        // Initialize app state
        let state = AppState::new(config).await.unwrap();

        // Create HTTP client
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = feedbridge::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: addr_str,
            state,
            _temp_dir: temp_dir,
            client,
            image_host,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// POST a webhook body to /receiver with the given token
    pub async fn send_webhook(&self, token: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url("/receiver"))
            .header("Authorization", format!("Token {token}"))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    /// Send an article event as the admin token
    pub async fn send_article_event(&self, event: &str, entry: Value) -> reqwest::Response {
        self.send_webhook(
            ADMIN_TOKEN,
            json!({"model": ARTICLE_MODEL, "event": event, "entry": entry}),
        )
        .await
    }

    /// Store a published article through the receiver
    pub async fn publish_article(&self, id: i64, published_at: &str, roles: &[&str]) {
        let response = self
            .send_article_event(
                "entry.publish",
                json!({
                    "id": id,
                    "title": format!("Article {id}"),
                    "teaser": "Teaser",
                    "description": format!("<p>Body of {id}</p>"),
                    "publishedAt": published_at,
                    "updatedAt": published_at,
                    "roles": roles,
                }),
            )
            .await;
        assert!(response.status().is_success(), "publish failed: {}", response.status());
    }

    /// Create a consumer directly in the database
    pub async fn create_consumer(&self, name: &str, roles: &[&str]) -> Consumer {
        let consumer = Consumer {
            id: feedbridge::data::EntityId::new().0,
            name: name.to_string(),
            roles: Json(roles.iter().map(|role| role.to_string()).collect()),
        };
        self.state.db.insert_consumer(&consumer).await.unwrap();
        consumer
    }
}

/// Encode a solid-color PNG
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba([12, 99, 200, 255]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}
