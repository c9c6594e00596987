//! Service layer
//!
//! Contains business logic separated from HTTP handlers.
//! Services orchestrate database, cache and upstream image operations.

mod feed;
mod image_proxy;
mod mapping;
mod sync;

pub use feed::{ENCLOSURE_MIME_TYPE, FeedRenderer, item_link, plain_text, sanitize_body};
pub use image_proxy::{ImageCache, decode_oriented, encode_webp, resolve_image_url};
pub use mapping::{
    ARTICLE_SCHEMA, Column, ColumnKind, EntitySchema, FieldConverter, FieldValue, MappedFields,
    MappingError, entry_roles, parse_timestamp, schema_for_tag,
};
pub use sync::{Action, SyncHandler, SyncOutcome, Transition, WebhookEvent};
