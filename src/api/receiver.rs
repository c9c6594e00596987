//! Webhook receiver endpoint
//!
//! Accepts entry events from the upstream CMS.

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::post,
};

use crate::AppState;
use crate::auth::CurrentCaller;
use crate::error::AppError;
use crate::service::{SyncOutcome, WebhookEvent};

/// Create receiver router
///
/// Routes:
/// - POST /receiver
pub fn receiver_router() -> Router<AppState> {
    Router::new().route("/receiver", post(receive))
}

/// POST /receiver
///
/// Responds 201 when an entry was created and 204 when it was updated
/// or removed.
async fn receive(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Invalid request body: {e}")))?;

    let outcome = state.sync.handle(&caller, event).await?;

    Ok(match outcome {
        SyncOutcome::Created => StatusCode::CREATED,
        SyncOutcome::Updated | SyncOutcome::Deleted => StatusCode::NO_CONTENT,
    })
}
