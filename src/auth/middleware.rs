//! Authentication middleware
//!
//! Protects routes that require an access token.

use std::collections::HashSet;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, State},
    http::{HeaderMap, Request, request::Parts},
    middleware::Next,
    response::Response,
};

use super::permission::Permission;
use crate::AppState;
use crate::error::AppError;

/// Accepts `Authorization: Bearer <token>` and `Authorization: Token <token>`
fn extract_token_from_headers(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("Authorization")?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") && !scheme.eq_ignore_ascii_case("token") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_owned())
}

/// An authenticated token holder and what it may do
#[derive(Debug, Clone)]
pub struct Caller {
    pub name: String,
    pub permissions: HashSet<Permission>,
}

impl Caller {
    pub fn has(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    /// # Errors
    /// Returns `AppError::Forbidden` when the permission is not granted
    pub fn require(&self, permission: Permission) -> Result<(), AppError> {
        if self.has(permission) {
            Ok(())
        } else {
            tracing::warn!(caller = %self.name, %permission, "Permission denied");
            Err(AppError::Forbidden)
        }
    }
}

async fn authenticate_token(token: &str, state: &AppState) -> Result<Caller, AppError> {
    let access_token = state
        .db
        .get_access_token(token)
        .await?
        .ok_or(AppError::Unauthorized)?;

    let permissions = access_token
        .permissions
        .split_whitespace()
        .filter_map(|codename| match codename.parse::<Permission>() {
            Ok(permission) => Some(permission),
            Err(error) => {
                tracing::warn!(token = %access_token.name, %error, "Ignoring stored permission");
                None
            }
        })
        .collect();

    Ok(Caller {
        name: access_token.name,
        permissions,
    })
}

/// Middleware to require authentication
///
/// Any valid access token passes; the resolved `Caller` is added to
/// request extensions.
///
/// # Usage
/// ```ignore
/// let protected_routes = Router::new()
///     .route("/metrics", ...)
///     .layer(middleware::from_fn_with_state(state, require_auth));
/// ```
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token_from_headers(request.headers()).ok_or(AppError::Unauthorized)?;

    let caller = authenticate_token(&token, &state).await?;

    request.extensions_mut().insert(caller);

    Ok(next.run(request).await)
}

/// Extractor for the authenticated caller
///
/// # Usage
/// ```ignore
/// async fn handler(
///     CurrentCaller(caller): CurrentCaller,
/// ) -> impl IntoResponse {
///     format!("Hello, {}", caller.name)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentCaller(pub Caller);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentCaller
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(caller) = parts.extensions.get::<Caller>().cloned() {
            return Ok(CurrentCaller(caller));
        }

        let state = AppState::from_ref(state);
        let token = extract_token_from_headers(&parts.headers).ok_or(AppError::Unauthorized)?;
        let caller = authenticate_token(&token, &state).await?;
        parts.extensions.insert(caller.clone());

        Ok(CurrentCaller(caller))
    }
}
