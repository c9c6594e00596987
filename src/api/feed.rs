//! Atom feed endpoint

use axum::{
    Router,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::AppState;
use crate::error::AppError;

pub const ATOM_CONTENT_TYPE: &str = "application/atom+xml; charset=utf-8";

/// Create feed router
///
/// Routes:
/// - GET /article/atom/:consumer_id
pub fn feed_router() -> Router<AppState> {
    Router::new().route("/article/atom/:consumer_id", get(article_feed))
}

/// GET /article/atom/:consumer_id
async fn article_feed(
    State(state): State<AppState>,
    Path(consumer_id): Path<String>,
) -> Result<Response, AppError> {
    let document = state.feed.render_cached(&consumer_id).await?;

    Ok((
        [(header::CONTENT_TYPE, ATOM_CONTENT_TYPE)],
        document.as_str().to_owned(),
    )
        .into_response())
}
