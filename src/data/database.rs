//! SQLite database operations
//!
//! All database access goes through this module.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{Pool, QueryBuilder, Sqlite, SqlitePool};
use std::path::Path;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

use super::models::*;
use crate::error::AppError;
use crate::service::{EntitySchema, FieldValue, MappedFields};

const ACCESS_TOKEN_HASH_PREFIX: &str = "sha256:";

/// Hash a raw access token for storage and lookup
pub fn hash_access_token(access_token: &str) -> String {
    let digest = Sha256::digest(access_token.as_bytes());
    format!(
        "{}{}",
        ACCESS_TOKEN_HASH_PREFIX,
        URL_SAFE_NO_PAD.encode(digest)
    )
}

fn push_field_value(builder: &mut QueryBuilder<'_, Sqlite>, value: FieldValue) {
    match value {
        FieldValue::Text(text) => builder.push_bind(text),
        FieldValue::Null => builder.push_bind(Option::<String>::None),
        FieldValue::Timestamp(timestamp) => builder.push_bind(timestamp),
        FieldValue::Roles(roles) => builder.push_bind(Json(roles)),
        FieldValue::Flags(flags) => builder.push_bind(Json(flags)),
        FieldValue::Json(value) => builder.push_bind(Json(value)),
    };
}

/// Database connection pool wrapper
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    // =========================================================================
    // Connection
    // =========================================================================

    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Arguments
    /// * `path` - Path to SQLite database file
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }

    // =========================================================================
    // Synchronized entities
    // =========================================================================

    /// Insert or update a synchronized entity row
    ///
    /// Runs in one transaction: the row is inserted with `fields` layered
    /// over the schema's insert defaults unless the key already exists, in
    /// which case only the columns present in `fields` are overwritten.
    /// Concurrent calls for the same key never both insert.
    ///
    /// # Returns
    /// `true` if a new row was inserted, `false` if an existing one was updated.
    pub async fn upsert_entity(
        &self,
        schema: &EntitySchema,
        key: i64,
        fields: &MappedFields,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut row = (schema.insert_defaults)(now);
        for (column, value) in fields.iter() {
            row.insert(column, value.clone());
        }

        let mut tx = self.pool.begin().await?;

        let mut insert = QueryBuilder::<Sqlite>::new(format!(
            "INSERT INTO {} ({}",
            schema.table, schema.primary_key
        ));
        for (column, _) in row.iter() {
            insert.push(", ").push(column);
        }
        insert.push(") VALUES (");
        insert.push_bind(key);
        for (_, value) in row.iter() {
            insert.push(", ");
            push_field_value(&mut insert, value.clone());
        }
        insert.push(format!(") ON CONFLICT({}) DO NOTHING", schema.primary_key));

        let inserted = insert.build().execute(&mut *tx).await?.rows_affected() == 1;

        if !inserted && !fields.is_empty() {
            let mut update = QueryBuilder::<Sqlite>::new(format!("UPDATE {} SET ", schema.table));
            for (index, (column, value)) in fields.iter().enumerate() {
                if index > 0 {
                    update.push(", ");
                }
                update.push(format!("{column} = "));
                push_field_value(&mut update, value.clone());
            }
            update.push(format!(" WHERE {} = ", schema.primary_key));
            update.push_bind(key);
            update.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;

        Ok(inserted)
    }

    /// Delete a synchronized entity row
    ///
    /// # Returns
    /// `true` if a row was deleted, `false` if no row had that key.
    pub async fn delete_entity(&self, schema: &EntitySchema, key: i64) -> Result<bool, AppError> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE {} = ?",
            schema.table, schema.primary_key
        ))
        .bind(key)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Article
    // =========================================================================

    /// Get article by upstream ID
    pub async fn get_article(&self, id: i64) -> Result<Option<Article>, AppError> {
        let article = sqlx::query_as::<_, Article>("SELECT * FROM articles WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(article)
    }

    /// Get published articles sharing at least one role with `roles`
    ///
    /// Newest publication first, at most `limit` rows.
    pub async fn get_feed_articles(
        &self,
        roles: &[String],
        limit: usize,
    ) -> Result<Vec<Article>, AppError> {
        let articles = sqlx::query_as::<_, Article>(
            r#"
            SELECT * FROM articles
            WHERE published IS NOT NULL
              AND EXISTS (
                  SELECT 1 FROM json_each(articles.roles) AS article_role
                  WHERE article_role.value IN (SELECT value FROM json_each(?))
              )
            ORDER BY published DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(Json(roles))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(articles)
    }

    /// Count stored articles
    pub async fn count_articles(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    // =========================================================================
    // Consumer
    // =========================================================================

    /// Get consumer by ID
    pub async fn get_consumer(&self, id: &str) -> Result<Option<Consumer>, AppError> {
        let consumer = sqlx::query_as::<_, Consumer>("SELECT * FROM consumers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(consumer)
    }

    /// List all consumers ordered by name
    pub async fn list_consumers(&self) -> Result<Vec<Consumer>, AppError> {
        let consumers =
            sqlx::query_as::<_, Consumer>("SELECT * FROM consumers ORDER BY name ASC, id ASC")
                .fetch_all(&self.pool)
                .await?;

        Ok(consumers)
    }

    /// Insert a new consumer
    pub async fn insert_consumer(&self, consumer: &Consumer) -> Result<(), AppError> {
        sqlx::query("INSERT INTO consumers (id, name, roles) VALUES (?, ?, ?)")
            .bind(&consumer.id)
            .bind(&consumer.name)
            .bind(&consumer.roles)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Replace name and roles of a consumer
    ///
    /// # Returns
    /// `true` if updated, `false` if no matching consumer exists.
    pub async fn update_consumer(&self, consumer: &Consumer) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE consumers SET name = ?, roles = ? WHERE id = ?")
            .bind(&consumer.name)
            .bind(&consumer.roles)
            .bind(&consumer.id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete a consumer
    ///
    /// # Returns
    /// `true` if deleted, `false` if no matching consumer exists.
    pub async fn delete_consumer(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM consumers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Access tokens
    // =========================================================================

    /// Create or update a named access token
    ///
    /// The raw token is hashed before it is stored.
    pub async fn upsert_access_token(
        &self,
        name: &str,
        raw_token: &str,
        permissions: &[String],
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO access_tokens (id, name, token_hash, permissions, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                token_hash = excluded.token_hash,
                permissions = excluded.permissions
            "#,
        )
        .bind(EntityId::new().0)
        .bind(name)
        .bind(hash_access_token(raw_token))
        .bind(permissions.join(" "))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Look up an access token by its raw value
    pub async fn get_access_token(&self, raw_token: &str) -> Result<Option<AccessToken>, AppError> {
        let token =
            sqlx::query_as::<_, AccessToken>("SELECT * FROM access_tokens WHERE token_hash = ?")
                .bind(hash_access_token(raw_token))
                .fetch_optional(&self.pool)
                .await?;

        Ok(token)
    }
}
