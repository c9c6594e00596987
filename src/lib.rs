//! feedbridge - CMS to Atom syndication bridge
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - Webhook receiver                                         │
//! │  - Atom feeds and image proxy                               │
//! │  - Admin/Metrics endpoints                                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Field mapping and synchronization                        │
//! │  - Feed rendering, image fetching                           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - SQLite (sqlx)                                            │
//! │  - Moka response caches                                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `service`: Business logic layer
//! - `data`: Database and cache layer
//! - `auth`: Access token authentication
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod service;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;

/// Webhook payloads carry full entries; anything larger is rejected
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Application state shared across all handlers
///
/// This struct is cloned for each request and contains
/// shared resources like database pool, caches and services.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// Webhook event handler
    pub sync: Arc<service::SyncHandler>,

    /// Decoded image cache (volatile)
    pub images: Arc<service::ImageCache>,

    /// Encoded WebP responses (volatile, short-lived)
    pub image_responses: Arc<data::ResponseCache<(data::EntityKind, i64), Bytes>>,

    /// Atom feed renderer with its response cache
    pub feed: Arc<service::FeedRenderer>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to SQLite database
    /// 2. Initialize HTTP client
    /// 3. Initialize caches and services
    /// 4. Provision access tokens
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Connect to SQLite database
        let db = Arc::new(data::Database::connect(&config.database.path).await?);
        tracing::info!("Database connected");

        // 2. Initialize HTTP client
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("feedbridge/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(config.feed.image_timeout_seconds))
            .build()
            .map_err(|e| error::AppError::Internal(e.into()))?;

        // 3. Initialize caches and services
        let images = Arc::new(service::ImageCache::new(
            db.clone(),
            http_client,
            &config.feed,
            &config.cache,
        )?);
        let image_responses = Arc::new(data::ResponseCache::new(
            "image_response",
            Duration::from_secs(config.cache.image_response_ttl),
        ));
        let feed = Arc::new(service::FeedRenderer::new(
            db.clone(),
            images.clone(),
            config.feed.article.clone(),
            config.server.base_url(),
            Duration::from_secs(config.cache.feed_ttl),
        )?);
        let sync = Arc::new(service::SyncHandler::new(
            db.clone(),
            config.feed.article.roles.clone(),
        ));
        tracing::info!("Caches initialized");

        // 4. Provision access tokens
        Self::provision_tokens(&db, &config).await?;

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            db,
            sync,
            images,
            image_responses,
            feed,
        })
    }

    /// Upsert configured access tokens by name
    async fn provision_tokens(
        db: &data::Database,
        config: &config::AppConfig,
    ) -> Result<(), error::AppError> {
        if config.auth.tokens.is_empty() {
            tracing::warn!("No access tokens configured; receiver and admin endpoints are unusable");
            return Ok(());
        }

        for token in &config.auth.tokens {
            db.upsert_access_token(&token.name, &token.token, &token.permissions)
                .await?;
            tracing::info!(
                name = %token.name,
                permissions = ?token.permissions,
                "Access token provisioned"
            );
        }

        Ok(())
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::{
        compression::CompressionLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
    };

    let cors_layer = build_cors_layer(&state.config.server);

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(api::receiver_router())
        .merge(api::feed_router())
        .merge(api::image_router())
        .nest("/admin", api::admin_router())
        .merge(api::metrics_router(state.clone()))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::{HeaderValue, Method};
    use tower_http::cors::{Any, CorsLayer};

    if !server.protocol.eq_ignore_ascii_case("https") {
        return CorsLayer::permissive();
    }

    let allowed_origin = server.base_url();
    match HeaderValue::from_str(&allowed_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers(Any),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %allowed_origin,
                "Failed to parse CORS origin from server base URL; denying cross-origin requests"
            );
            CorsLayer::new().allow_methods(Any).allow_headers(Any)
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}
