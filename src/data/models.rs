//! Data models
//!
//! Rust structs representing database entities.
//! Generated IDs use ULID; timestamps use chrono.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Entity registry
// =============================================================================

/// Closed set of persisted entity types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Article,
    Consumer,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::Consumer => "consumer",
        }
    }

    /// Resolve the model name used in image proxy URLs (case-insensitive)
    pub fn from_model_name(name: &str) -> Option<Self> {
        [Self::Article, Self::Consumer]
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
    }

    /// Whether rows of this type carry a remote image
    pub fn publishes_images(&self) -> bool {
        matches!(self, Self::Article)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Article
// =============================================================================

/// An article mirrored from the upstream CMS
///
/// Rows are owned by the webhook synchronizer; `id` is assigned upstream.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Article {
    pub id: i64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    /// Null until the article is public
    pub published: Option<DateTime<Utc>>,
    pub title: String,
    pub subtitle: Option<String>,
    pub teaser: String,
    /// HTML body
    pub body: Option<String>,
    pub link: Option<String>,
    /// Path or URL of the upstream image
    pub image: Option<String>,
    pub roles: Json<Vec<String>>,
    pub flags: Json<BTreeMap<String, String>>,
    /// Last upstream payload, kept for audit and replay
    pub original: Json<serde_json::Value>,
}

// =============================================================================
// Consumer
// =============================================================================

/// A feed subscriber; its roles select which articles its feed contains
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Consumer {
    pub id: String,
    pub name: String,
    pub roles: Json<Vec<String>>,
}

// =============================================================================
// Access tokens
// =============================================================================

/// Credential for the receiver and admin endpoints
///
/// Only the hash of the token is stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccessToken {
    pub id: String,
    pub name: String,
    /// "sha256:" followed by the base64url digest
    pub token_hash: String,
    /// Space-separated permission codenames
    pub permissions: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_names_resolve_case_insensitively() {
        assert_eq!(
            EntityKind::from_model_name("Article"),
            Some(EntityKind::Article)
        );
        assert_eq!(
            EntityKind::from_model_name("consumer"),
            Some(EntityKind::Consumer)
        );
        assert_eq!(EntityKind::from_model_name("Status"), None);
    }

    #[test]
    fn only_articles_publish_images() {
        assert!(EntityKind::Article.publishes_images());
        assert!(!EntityKind::Consumer.publishes_images());
    }

    #[test]
    fn entity_ids_are_ulids() {
        let id = EntityId::new();
        assert_eq!(id.0.len(), 26);
        assert!(ulid::Ulid::from_string(&id.0).is_ok());
    }
}
