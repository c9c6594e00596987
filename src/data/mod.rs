//! Data layer module
//!
//! Handles all data persistence and caching:
//! - SQLite database operations
//! - Rendered feed cache (volatile)
//! - Encoded image cache (volatile)

mod cache;
mod database;
mod models;

pub use cache::ResponseCache;
pub use database::{Database, hash_access_token};
pub use models::*;
