//! Image proxy endpoint
//!
//! Serves entity images re-encoded as WebP.

use axum::{
    Router,
    body::Bytes,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::AppState;
use crate::data::EntityKind;
use crate::error::AppError;
use crate::service::{ENCLOSURE_MIME_TYPE, encode_webp};

const IMAGE_CACHE_CONTROL: &str = "private,max-age=604800";

/// Create image router
///
/// Routes:
/// - GET /image/:entity_type/:entity_id
pub fn image_router() -> Router<AppState> {
    Router::new().route("/image/:entity_type/:entity_id", get(entity_image))
}

/// GET /image/:entity_type/:entity_id
///
/// 404 when the type is unknown or has no images, the entity does not
/// exist, or its image cannot be obtained.
async fn entity_image(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let kind = EntityKind::from_model_name(&entity_type).ok_or(AppError::NotFound)?;
    if !kind.publishes_images() {
        return Err(AppError::NotFound);
    }
    let id: i64 = entity_id.parse().map_err(|_| AppError::NotFound)?;

    let images = state.images.clone();
    let webp = state
        .image_responses
        .get_or_try_insert((kind, id), async move {
            let image = images.get(kind, id).await?.ok_or(AppError::NotFound)?;
            let encoded = tokio::task::spawn_blocking(move || encode_webp(&image))
                .await
                .map_err(|e| AppError::Internal(e.into()))?
                .map_err(|e| AppError::Internal(e.into()))?;
            Ok(Bytes::from(encoded))
        })
        .await?;

    Ok((
        [
            (header::CONTENT_TYPE, ENCLOSURE_MIME_TYPE),
            (header::CACHE_CONTROL, IMAGE_CACHE_CONTROL),
        ],
        webp,
    )
        .into_response())
}
