//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration files (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::str::FromStr;

use crate::auth::Permission;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    pub feed: FeedConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain (e.g., "feeds.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the public base URL of this service
    ///
    /// # Returns
    /// Full URL like "https://feeds.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Access token provisioning
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuthConfig {
    /// Tokens upserted into the database on startup
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

/// A single provisioned access token
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// Unique label, used as the upsert key
    pub name: String,
    /// Raw token value presented by callers (stored hashed)
    pub token: String,
    /// Permission codenames, e.g. "feed.add_article"
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Feed and image proxy settings
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub article: ArticleFeedConfig,
    /// Timeout for outbound image fetches in seconds (default: 10)
    pub image_timeout_seconds: u64,
}

/// Article feed settings
#[derive(Debug, Clone, Deserialize)]
pub struct ArticleFeedConfig {
    /// Feed title (default: "Article")
    pub title: String,
    pub description: String,
    pub copyright: String,
    /// Site URL; feed id, alternate link and base for relative links in bodies
    pub url: String,
    /// Maximum number of entries per feed (default: 20)
    pub items: usize,
    /// Template for entry links; receives an `id` query parameter
    pub item_url: String,
    /// Base URL that stored image paths are resolved against
    pub image_url: String,
    /// Extra headers sent with every outbound image request
    #[serde(default)]
    pub image_headers: HashMap<String, String>,
    /// Role tags eligible for ingestion; empty accepts every entry
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Decoded image TTL in seconds (default: 3600)
    pub image_ttl: u64,
    /// Encoded image response TTL in seconds (default: 60)
    pub image_response_ttl: u64,
    /// Rendered feed TTL in seconds (default: 1)
    pub feed_ttl: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (FEEDBRIDGE__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.protocol", "http")?
            .set_default("database.path", "data/feedbridge.db")?
            .set_default("feed.image_timeout_seconds", 10)?
            .set_default("feed.article.title", "Article")?
            .set_default("feed.article.description", "")?
            .set_default("feed.article.copyright", "")?
            .set_default("feed.article.items", 20)?
            .set_default("cache.image_ttl", 3600)?
            .set_default("cache.image_response_ttl", 60)?
            .set_default("cache.feed_ttl", 1)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("FEEDBRIDGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), crate::error::AppError> {
        const MIN_TOKEN_BYTES: usize = 16;

        let article = &self.feed.article;
        for (key, value) in [
            ("feed.article.url", &article.url),
            ("feed.article.item_url", &article.item_url),
            ("feed.article.image_url", &article.image_url),
        ] {
            if url::Url::parse(value).is_err() {
                return Err(crate::error::AppError::Config(format!(
                    "{key} must be an absolute URL, got {value:?}"
                )));
            }
        }

        if article.items == 0 {
            return Err(crate::error::AppError::Config(
                "feed.article.items must be greater than 0".to_string(),
            ));
        }

        for (name, value) in &article.image_headers {
            if http::HeaderName::from_bytes(name.as_bytes()).is_err()
                || http::HeaderValue::from_str(value).is_err()
            {
                return Err(crate::error::AppError::Config(format!(
                    "feed.article.image_headers contains an invalid header: {name}"
                )));
            }
        }

        let mut names = HashSet::new();
        for token in &self.auth.tokens {
            if !names.insert(token.name.as_str()) {
                return Err(crate::error::AppError::Config(format!(
                    "auth.tokens contains duplicate name {:?}",
                    token.name
                )));
            }
            if token.token.len() < MIN_TOKEN_BYTES {
                return Err(crate::error::AppError::Config(format!(
                    "auth.tokens[{}].token must be at least {} bytes",
                    token.name, MIN_TOKEN_BYTES
                )));
            }
            for codename in &token.permissions {
                Permission::from_str(codename).map_err(|_| {
                    crate::error::AppError::Config(format!(
                        "auth.tokens[{}] has unknown permission {codename:?}",
                        token.name
                    ))
                })?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
            },
            database: DatabaseConfig {
                path: PathBuf::from("/tmp/feedbridge-test.db"),
            },
            auth: AuthConfig {
                tokens: vec![TokenConfig {
                    name: "cms".to_string(),
                    token: "x".repeat(32),
                    permissions: vec!["feed.add_article".to_string()],
                }],
            },
            feed: FeedConfig {
                article: ArticleFeedConfig {
                    title: "Article".to_string(),
                    description: "News".to_string(),
                    copyright: "Example".to_string(),
                    url: "https://www.example.com/".to_string(),
                    items: 20,
                    item_url: "https://www.example.com/news".to_string(),
                    image_url: "https://cms.example.com/".to_string(),
                    image_headers: HashMap::new(),
                    roles: Vec::new(),
                },
                image_timeout_seconds: 10,
            },
            cache: CacheConfig {
                image_ttl: 3600,
                image_response_ttl: 60,
                feed_ttl: 1,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    #[test]
    fn validate_accepts_complete_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_relative_item_url() {
        let mut config = valid_config();
        config.feed.article.item_url = "/news".to_string();

        let error = config
            .validate()
            .expect_err("relative item url must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("feed.article.item_url")
        ));
    }

    #[test]
    fn validate_rejects_unknown_permission() {
        let mut config = valid_config();
        config.auth.tokens[0].permissions = vec!["feed.publish_article".to_string()];

        let error = config
            .validate()
            .expect_err("unknown permission must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("feed.publish_article")
        ));
    }

    #[test]
    fn validate_rejects_short_token() {
        let mut config = valid_config();
        config.auth.tokens[0].token = "short".to_string();

        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_invalid_image_header() {
        let mut config = valid_config();
        config
            .feed
            .article
            .image_headers
            .insert("bad header".to_string(), "value".to_string());

        assert!(config.validate().is_err());
    }

    #[test]
    fn base_url_joins_protocol_and_domain() {
        let config = valid_config();
        assert_eq!(config.server.base_url(), "http://localhost");
    }
}
