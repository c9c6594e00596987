//! Webhook synchronization
//!
//! Applies upstream CMS events to local storage. Events are
//! `<entity>.<action>`; create, update and publish synchronize the entry,
//! unpublish and delete remove it.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use super::mapping::{EntitySchema, entry_roles, schema_for_tag};
use crate::auth::{Caller, Capability, Permission};
use crate::data::Database;
use crate::error::AppError;
use crate::metrics::WEBHOOK_EVENTS_TOTAL;

/// Webhook request body
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Short entity type selector, e.g. `infocenter-article`
    pub model: Option<String>,
    /// Fully qualified selector; preferred over `model` when both are sent
    pub uid: Option<String>,
    pub event: Option<String>,
    #[serde(default = "empty_entry")]
    pub entry: Value,
}

impl WebhookEvent {
    /// Entity type selector, `uid` first
    pub fn selector(&self) -> Option<&str> {
        self.uid.as_deref().or(self.model.as_deref())
    }
}

fn empty_entry() -> Value {
    Value::Object(Default::default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
    Publish,
    Unpublish,
    Delete,
}

/// What an action does to local storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Synchronize,
    Desynchronize,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Publish => "publish",
            Self::Unpublish => "unpublish",
            Self::Delete => "delete",
        }
    }

    pub fn transition(&self) -> Transition {
        match self {
            Self::Create | Self::Update | Self::Publish => Transition::Synchronize,
            Self::Unpublish | Self::Delete => Transition::Desynchronize,
        }
    }

    /// Capability a caller needs to perform this action
    pub fn required_capability(&self) -> Capability {
        match self {
            Self::Create => Capability::Add,
            Self::Update | Self::Publish => Capability::Change,
            Self::Unpublish | Self::Delete => Capability::Delete,
        }
    }
}

impl FromStr for Action {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "publish" => Ok(Self::Publish),
            "unpublish" => Ok(Self::Unpublish),
            "delete" => Ok(Self::Delete),
            _ => Err(()),
        }
    }
}

/// Outcome of an applied event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Created,
    Updated,
    Deleted,
}

impl SyncOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

/// Sync handler
pub struct SyncHandler {
    db: Arc<Database>,
    /// Role tags eligible for ingestion; empty accepts everything
    eligible_roles: Vec<String>,
}

impl SyncHandler {
    /// Create new sync handler
    pub fn new(db: Arc<Database>, eligible_roles: Vec<String>) -> Self {
        Self { db, eligible_roles }
    }

    /// Validate and apply a webhook event on behalf of `caller`
    ///
    /// Checks run in order: entity type, ingestion eligibility, event,
    /// action, permission. Nothing is written unless all pass.
    ///
    /// # Errors
    /// - `AppError::Validation` for unknown types, ineligible entries,
    ///   missing events or unknown actions
    /// - `AppError::Forbidden` if the caller lacks the permission
    /// - `AppError::Mapping` if the entry cannot be mapped
    /// - `AppError::NotFound` when deleting a missing entry
    pub async fn handle(
        &self,
        caller: &Caller,
        event: WebhookEvent,
    ) -> Result<SyncOutcome, AppError> {
        let model = event.selector().unwrap_or_default().to_string();
        let schema = schema_for_tag(&model).ok_or_else(|| {
            AppError::Validation(format!("Unknown model specified: {model}"))
        })?;

        if !self.can_receive(&event.entry) {
            return Err(AppError::Validation(
                "Entry is not applicable for storage".to_string(),
            ));
        }

        let name = event
            .event
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| AppError::Validation("No applicable event found".to_string()))?;

        let action = name
            .rsplit_once('.')
            .map_or(name, |(_, action)| action)
            .parse::<Action>()
            .map_err(|_| AppError::Validation("No matching handler found".to_string()))?;

        caller.require(Permission::new(action.required_capability(), schema.kind))?;

        let result = match action.transition() {
            Transition::Synchronize => self.synchronize(schema, &event.entry).await,
            Transition::Desynchronize => self.desynchronize(schema, &event.entry).await,
        };

        let outcome_label = match &result {
            Ok(outcome) => outcome.as_str(),
            Err(AppError::NotFound) => "not_found",
            Err(AppError::Mapping(_)) => "invalid",
            Err(_) => "error",
        };
        WEBHOOK_EVENTS_TOTAL
            .with_label_values(&[schema.kind.as_str(), action.as_str(), outcome_label])
            .inc();

        if let Ok(outcome) = &result {
            tracing::info!(
                entity = %schema.kind,
                action = action.as_str(),
                outcome = outcome.as_str(),
                caller = %caller.name,
                "Applied webhook event"
            );
        }

        result
    }

    fn can_receive(&self, entry: &Value) -> bool {
        if self.eligible_roles.is_empty() {
            return true;
        }
        entry_roles(entry)
            .iter()
            .any(|role| self.eligible_roles.contains(role))
    }

    /// Insert or update the entry; idempotent
    pub async fn synchronize(
        &self,
        schema: &EntitySchema,
        entry: &Value,
    ) -> Result<SyncOutcome, AppError> {
        let key = schema.extract_key(entry)?;
        let fields = schema.map(entry)?;

        let created = self.db.upsert_entity(schema, key, &fields, Utc::now()).await?;

        if created {
            tracing::info!(entity = %schema.kind, id = key, "Created entity");
            Ok(SyncOutcome::Created)
        } else {
            tracing::info!(entity = %schema.kind, id = key, "Updated entity");
            Ok(SyncOutcome::Updated)
        }
    }

    /// Remove the entry
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if no row has the entry's key
    pub async fn desynchronize(
        &self,
        schema: &EntitySchema,
        entry: &Value,
    ) -> Result<SyncOutcome, AppError> {
        let key = schema.extract_key(entry)?;

        if !self.db.delete_entity(schema, key).await? {
            tracing::debug!(entity = %schema.kind, id = key, "Entity to delete does not exist");
            return Err(AppError::NotFound);
        }

        tracing::info!(entity = %schema.kind, id = key, "Deleted entity");
        Ok(SyncOutcome::Deleted)
    }
}
