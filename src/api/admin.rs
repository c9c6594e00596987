//! Admin API endpoints
//!
//! Consumer administration.
//! All routes require an access token with the matching permission.

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
};
use sqlx::types::Json as SqlJson;

use super::dto::{ConsumerRequest, ConsumerResponse};
use crate::AppState;
use crate::auth::{Capability, CurrentCaller, Permission};
use crate::data::{Consumer, EntityKind};
use crate::error::AppError;

const fn consumer_permission(capability: Capability) -> Permission {
    Permission::new(capability, EntityKind::Consumer)
}

/// Create admin router
///
/// Routes:
/// - GET /admin/consumers - List consumers
/// - POST /admin/consumers - Create consumer
/// - GET /admin/consumers/:id - Get consumer
/// - PUT /admin/consumers/:id - Replace consumer
/// - DELETE /admin/consumers/:id - Delete consumer
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/consumers", get(list_consumers).post(create_consumer))
        .route(
            "/consumers/:id",
            get(get_consumer)
                .put(update_consumer)
                .delete(delete_consumer),
        )
}

// =============================================================================
// Consumers
// =============================================================================

/// GET /admin/consumers
async fn list_consumers(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
) -> Result<Json<Vec<ConsumerResponse>>, AppError> {
    caller.require(consumer_permission(Capability::View))?;

    let consumers = state.db.list_consumers().await?;
    Ok(Json(consumers.into_iter().map(Into::into).collect()))
}

/// POST /admin/consumers
async fn create_consumer(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    Json(request): Json<ConsumerRequest>,
) -> Result<(StatusCode, Json<ConsumerResponse>), AppError> {
    caller.require(consumer_permission(Capability::Add))?;

    let consumer = request.into_new_consumer()?;
    state.db.insert_consumer(&consumer).await?;

    tracing::info!(id = %consumer.id, name = %consumer.name, caller = %caller.name, "Consumer created");

    Ok((StatusCode::CREATED, Json(consumer.into())))
}

/// GET /admin/consumers/:id
async fn get_consumer(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    Path(id): Path<String>,
) -> Result<Json<ConsumerResponse>, AppError> {
    caller.require(consumer_permission(Capability::View))?;

    let consumer = state.db.get_consumer(&id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(consumer.into()))
}

/// PUT /admin/consumers/:id
async fn update_consumer(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    Path(id): Path<String>,
    Json(request): Json<ConsumerRequest>,
) -> Result<Json<ConsumerResponse>, AppError> {
    caller.require(consumer_permission(Capability::Change))?;

    let (name, roles) = request.validate()?;
    let consumer = Consumer {
        id,
        name,
        roles: SqlJson(roles),
    };

    if !state.db.update_consumer(&consumer).await? {
        return Err(AppError::NotFound);
    }

    tracing::info!(id = %consumer.id, caller = %caller.name, "Consumer updated");

    Ok(Json(consumer.into()))
}

/// DELETE /admin/consumers/:id
async fn delete_consumer(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    caller.require(consumer_permission(Capability::Delete))?;

    if !state.db.delete_consumer(&id).await? {
        return Err(AppError::NotFound);
    }

    tracing::info!(%id, caller = %caller.name, "Consumer deleted");

    Ok(StatusCode::NO_CONTENT)
}
