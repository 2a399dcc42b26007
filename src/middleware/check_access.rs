use crate::errors::{ApiError, ApiResult};
use crate::service::auth_service::AuthService;
use crate::AppState;
use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

/// Middleware resolving the acting user for routes that require a login.
///
/// The access token is read from the `token` cookie or a `Bearer` `Authorization`
/// header and looked up through `AuthService::authenticate`. On success the
/// [`User`](crate::model::user::User) is inserted into the request extensions,
/// otherwise the request is rejected with `401 Unauthorized`.
pub async fn check_access(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let token = get_cookie(&request, "token")
        .or_else(|| extract_bearer(&request))
        .ok_or_else(|| ApiError::Unauthorized("Login required".to_string()))?;

    let user = AuthService::authenticate(&state.db, &token)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid token".to_string()))?;

    debug!(user = %user.username, path = %request.uri().path(), "authenticated");
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

// Helper function to extract Bearer token from Authorization header
fn extract_bearer(request: &Request) -> Option<String> {
    let auth_header = request.headers().get(header::AUTHORIZATION)?;
    let auth_str = auth_header.to_str().ok()?;
    let token = auth_str.strip_prefix("Bearer ")?;

    Some(token.trim().to_string())
}

// Helper function to get a cookie by name from the request
fn get_cookie(request: &Request, name: &str) -> Option<String> {
    let cookie_header = request.headers().get(header::COOKIE)?;
    let cookie_str = cookie_header.to_str().ok()?;

    cookie_str.split(';').find_map(|s| {
        let (cookie_name, cookie_value) = s.trim().split_once('=')?;

        if cookie_name == name {
            Some(cookie_value.to_string())
        } else {
            None
        }
    })
}
