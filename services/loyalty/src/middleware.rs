//! Middleware for cookie-based JWT authentication

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::{error::ApiError, state::AppState};

/// Name of the authentication cookie.
pub const AUTH_COOKIE: &str = "AuthToken";

/// Authenticated user extracted from the token claims
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub login: String,
}

/// Validate the `AuthToken` cookie and store the authenticated user in
/// the request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let cookie_header = req
        .headers()
        .get(header::COOKIE)
        .and_then(|header| header.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    let token = cookie_value(cookie_header, AUTH_COOKIE).ok_or(ApiError::Unauthorized)?;

    let claims = state.jwt.verify(token).map_err(|e| {
        debug!("Token validation failed: {}", e);
        ApiError::Unauthorized
    })?;

    req.extensions_mut().insert(AuthUser {
        id: claims.sub,
        login: claims.login,
    });

    Ok(next.run(req).await)
}

/// Extract a cookie value from a `Cookie` request header.
fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|pair| pair.strip_prefix(name)?.strip_prefix('='))
}
