use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::errors::auth_error::AuthError;
use crate::state::AppState;

/// Authentication middleware that validates bearer API secrets
///
/// The middleware:
/// 1. Passes every request through when `auth_required` is disabled
/// 2. Extracts the Authorization header and parses the bearer token
/// 3. Compares the token against the configured API secret in constant time
/// 4. Returns 401 when validation fails
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if !state.config.auth_required {
        tracing::debug!("Authentication disabled, passing request through");
        return Ok(next.run(request).await);
    }

    let secret = state.config.auth_api_secret.as_ref().ok_or_else(|| {
        AuthError::ConfigError("Authentication required but no API secret configured".to_string())
    })?;

    let auth_header = request
        .headers()
        .get("authorization")
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthHeader)?;

    if !constant_time_eq(token.as_bytes(), secret.as_bytes()) {
        tracing::warn!(
            method = %request.method(),
            path = %request.uri().path(),
            "API secret authentication failed: token mismatch"
        );
        return Err(AuthError::Unauthorized("Invalid API secret".to_string()));
    }

    tracing::debug!(
        method = %request.method(),
        path = %request.uri().path(),
        "API secret authentication successful"
    );
    Ok(next.run(request).await)
}

/// Constant-time byte comparison so token checks do not leak length-prefix
/// timing.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
