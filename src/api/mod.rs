//! API layer
//!
//! HTTP handlers for:
//! - Webhook receiver (for the upstream CMS)
//! - Atom feeds and image proxy (for consumers)
//! - Admin API
//! - Metrics (Prometheus)

mod admin;
mod dto;
mod feed;
mod media;
pub mod metrics;
mod receiver;

pub use dto::*;

pub use admin::admin_router;
pub use feed::{ATOM_CONTENT_TYPE, feed_router};
pub use media::image_router;
pub use metrics::metrics_router;
pub use receiver::receiver_router;
