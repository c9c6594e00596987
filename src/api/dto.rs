//! Admin API request and response DTOs

use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use crate::data::{Consumer, EntityId};
use crate::error::AppError;

const MAX_CONSUMER_NAME_CHARS: usize = 256;
const MAX_ROLE_CHARS: usize = 32;

/// Consumer create/replace request
#[derive(Debug, Clone, Deserialize)]
pub struct ConsumerRequest {
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl ConsumerRequest {
    /// Check field constraints and normalize roles
    ///
    /// Names and roles are trimmed; duplicate roles are dropped.
    ///
    /// # Errors
    /// Returns `AppError::Validation` describing the first violated constraint
    pub fn validate(self) -> Result<(String, Vec<String>), AppError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("name must not be empty".to_string()));
        }
        if name.chars().count() > MAX_CONSUMER_NAME_CHARS {
            return Err(AppError::Validation(format!(
                "name must be at most {MAX_CONSUMER_NAME_CHARS} characters"
            )));
        }

        let mut roles: Vec<String> = Vec::with_capacity(self.roles.len());
        for role in self.roles {
            let role = role.trim().to_string();
            if role.is_empty() {
                return Err(AppError::Validation("roles must not be empty".to_string()));
            }
            if role.chars().count() > MAX_ROLE_CHARS {
                return Err(AppError::Validation(format!(
                    "role {role:?} exceeds {MAX_ROLE_CHARS} characters"
                )));
            }
            if !roles.contains(&role) {
                roles.push(role);
            }
        }

        Ok((name, roles))
    }

    /// Build a new consumer with a generated ID
    pub fn into_new_consumer(self) -> Result<Consumer, AppError> {
        let (name, roles) = self.validate()?;
        Ok(Consumer {
            id: EntityId::new().0,
            name,
            roles: Json(roles),
        })
    }
}

/// Consumer response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerResponse {
    pub id: String,
    pub name: String,
    pub roles: Vec<String>,
}

impl From<Consumer> for ConsumerResponse {
    fn from(consumer: Consumer) -> Self {
        Self {
            id: consumer.id,
            name: consumer.name,
            roles: consumer.roles.0,
        }
    }
}
