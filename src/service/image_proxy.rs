//! Image proxy service
//!
//! Fetches the upstream image of an entity, normalizes its orientation and
//! keeps the decoded bitmap in memory. Encoding for delivery happens in the
//! HTTP layer via [`encode_webp`].

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ImageDecoder, ImageReader};
use moka::future::Cache;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use crate::config::{ArticleFeedConfig, CacheConfig, FeedConfig};
use crate::data::{Database, EntityKind};
use crate::error::AppError;
use crate::metrics::observe_image_fetch;

/// Upper bound on decoded bitmaps kept in memory
const MAX_CACHED_IMAGES: u64 = 1_000;

/// Resolve a stored image reference against the configured image host
///
/// Absolute URLs are used unchanged; anything else replaces the path of
/// `base` while keeping its scheme, host and query.
pub fn resolve_image_url(base: &Url, image: &str) -> Option<Url> {
    let image = image.trim();
    if image.is_empty() {
        return None;
    }
    if let Ok(absolute) = Url::parse(image) {
        return Some(absolute);
    }

    let mut url = base.clone();
    let (path, query) = match image.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (image, None),
    };
    url.set_path(path);
    if query.is_some() {
        url.set_query(query);
    }
    Some(url)
}

/// Decode image bytes and apply their EXIF orientation
///
/// CPU-bound; call from `spawn_blocking`.
pub fn decode_oriented(bytes: &[u8]) -> Result<DynamicImage, image::ImageError> {
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    Ok(image)
}

/// Encode a bitmap as lossless WebP
///
/// CPU-bound; call from `spawn_blocking`.
pub fn encode_webp(image: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let rgba = image.to_rgba8();
    let mut bytes = Vec::new();
    rgba.write_with_encoder(WebPEncoder::new_lossless(&mut bytes))?;
    Ok(bytes)
}

/// Decoded image cache keyed by entity identity
pub struct ImageCache {
    db: Arc<Database>,
    http_client: reqwest::Client,
    base_url: Url,
    headers: HeaderMap,
    timeout: Duration,
    images: Cache<(EntityKind, i64), Arc<DynamicImage>>,
}

impl ImageCache {
    /// Create new image cache
    ///
    /// # Errors
    /// Returns `AppError::Config` if the image host or headers are invalid
    pub fn new(
        db: Arc<Database>,
        http_client: reqwest::Client,
        feed: &FeedConfig,
        cache: &CacheConfig,
    ) -> Result<Self, AppError> {
        let ArticleFeedConfig {
            image_url,
            image_headers,
            ..
        } = &feed.article;

        let base_url = Url::parse(image_url).map_err(|e| {
            AppError::Config(format!("feed.article.image_url is not a valid URL: {e}"))
        })?;
        let headers = build_headers(image_headers)?;

        let images = Cache::builder()
            .max_capacity(MAX_CACHED_IMAGES)
            .time_to_live(Duration::from_secs(cache.image_ttl))
            .build();

        Ok(Self {
            db,
            http_client,
            base_url,
            headers,
            timeout: Duration::from_secs(feed.image_timeout_seconds),
            images,
        })
    }

    /// Get the oriented image of an entity
    ///
    /// # Returns
    /// `None` when the entity type has no images, the row does not exist,
    /// it has no image, or the upstream image could not be fetched or
    /// decoded. Only successful loads are cached.
    ///
    /// # Errors
    /// Returns error only if the database lookup fails
    pub async fn get(&self, kind: EntityKind, id: i64) -> Result<Option<Arc<DynamicImage>>, AppError> {
        if !kind.publishes_images() {
            return Ok(None);
        }

        let key = (kind, id);
        if let Some(image) = self.images.get(&key).await {
            use crate::metrics::CACHE_HITS_TOTAL;
            CACHE_HITS_TOTAL.with_label_values(&["image"]).inc();
            return Ok(Some(image));
        }

        use crate::metrics::{CACHE_MISSES_TOTAL, CACHE_SIZE};
        CACHE_MISSES_TOTAL.with_label_values(&["image"]).inc();

        let Some(path) = self.image_path(kind, id).await? else {
            return Ok(None);
        };
        let Some(url) = resolve_image_url(&self.base_url, &path) else {
            return Ok(None);
        };

        let image = self
            .images
            .optionally_get_with(key, self.load(kind, id, url))
            .await;

        CACHE_SIZE
            .with_label_values(&["image"])
            .set(self.images.entry_count() as i64);

        Ok(image)
    }

    async fn image_path(&self, kind: EntityKind, id: i64) -> Result<Option<String>, AppError> {
        match kind {
            EntityKind::Article => Ok(self.db.get_article(id).await?.and_then(|a| a.image)),
            EntityKind::Consumer => Ok(None),
        }
    }

    async fn load(&self, kind: EntityKind, id: i64, url: Url) -> Option<Arc<DynamicImage>> {
        let started = Instant::now();

        let bytes = match self.download(&url).await {
            Ok(bytes) => bytes,
            Err(error) => {
                observe_image_fetch("error", started.elapsed());
                tracing::warn!(entity = %kind, id, %url, %error, "Image fetch failed");
                return None;
            }
        };

        let decoded = tokio::task::spawn_blocking(move || decode_oriented(&bytes)).await;
        match decoded {
            Ok(Ok(image)) => {
                observe_image_fetch("ok", started.elapsed());
                tracing::debug!(entity = %kind, id, %url, "Image loaded");
                Some(Arc::new(image))
            }
            Ok(Err(error)) => {
                observe_image_fetch("undecodable", started.elapsed());
                tracing::warn!(entity = %kind, id, %url, %error, "Image could not be decoded");
                None
            }
            Err(error) => {
                observe_image_fetch("undecodable", started.elapsed());
                tracing::warn!(entity = %kind, id, %url, %error, "Image decode task failed");
                None
            }
        }
    }

    async fn download(&self, url: &Url) -> Result<Vec<u8>, String> {
        let response = self
            .http_client
            .get(url.clone())
            .headers(self.headers.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| format!("Request failed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!(
                "HTTP {}: {}",
                response.status(),
                response.status().canonical_reason().unwrap_or("Unknown")
            ));
        }

        response
            .bytes()
            .await
            .map(|body| body.to_vec())
            .map_err(|e| format!("Failed to read body: {e}"))
    }
}

fn build_headers(configured: &HashMap<String, String>) -> Result<HeaderMap, AppError> {
    let mut headers = HeaderMap::new();
    for (name, value) in configured {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            AppError::Config(format!("feed.article.image_headers has invalid name {name:?}"))
        })?;
        let value = HeaderValue::from_str(value).map_err(|_| {
            AppError::Config(format!("feed.article.image_headers.{name} has an invalid value"))
        })?;
        headers.insert(name, value);
    }
    Ok(headers)
}
