//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Webhook Metrics
    pub static ref WEBHOOK_EVENTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("feedbridge_webhook_events_total", "Total number of webhook events applied"),
        &["entity_type", "action", "outcome"]
    ).expect("metric can be created");

    // Cache Metrics
    pub static ref CACHE_HITS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("feedbridge_cache_hits_total", "Total number of cache hits"),
        &["cache_name"]
    ).expect("metric can be created");
    pub static ref CACHE_MISSES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("feedbridge_cache_misses_total", "Total number of cache misses"),
        &["cache_name"]
    ).expect("metric can be created");
    pub static ref CACHE_SIZE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("feedbridge_cache_size", "Current number of items in cache"),
        &["cache_name"]
    ).expect("metric can be created");

    // Image Metrics
    pub static ref IMAGE_FETCHES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("feedbridge_image_fetches_total", "Total number of upstream image fetches"),
        &["status"]
    ).expect("metric can be created");
    pub static ref IMAGE_FETCH_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "feedbridge_image_fetch_duration_seconds",
            "Upstream image fetch duration in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["status"]
    ).expect("metric can be created");

    // Feed Metrics
    pub static ref FEED_RENDERS_TOTAL: IntCounter = IntCounter::new(
        "feedbridge_feed_renders_total",
        "Total number of feed documents rendered (cache misses)"
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("feedbridge_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(WEBHOOK_EVENTS_TOTAL.clone()))
        .expect("WEBHOOK_EVENTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(CACHE_HITS_TOTAL.clone()))
        .expect("CACHE_HITS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(CACHE_MISSES_TOTAL.clone()))
        .expect("CACHE_MISSES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(CACHE_SIZE.clone()))
        .expect("CACHE_SIZE can be registered");
    REGISTRY
        .register(Box::new(IMAGE_FETCHES_TOTAL.clone()))
        .expect("IMAGE_FETCHES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(IMAGE_FETCH_DURATION_SECONDS.clone()))
        .expect("IMAGE_FETCH_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(FEED_RENDERS_TOTAL.clone()))
        .expect("FEED_RENDERS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}

/// Record an upstream image fetch outcome.
pub fn observe_image_fetch(status: &str, elapsed: std::time::Duration) {
    IMAGE_FETCHES_TOTAL.with_label_values(&[status]).inc();
    IMAGE_FETCH_DURATION_SECONDS
        .with_label_values(&[status])
        .observe(elapsed.as_secs_f64());
}
