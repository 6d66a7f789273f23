use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Error codes for structured error responses
pub mod error_codes {
    pub const MISSING_AUTH_HEADER: &str = "missing_auth_header";
    pub const INVALID_AUTH_HEADER: &str = "invalid_auth_header";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const CONFIG_ERROR: &str = "config_error";
}

/// Authentication error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Authorization header is missing from request
    #[error("Missing Authorization header")]
    MissingAuthHeader,

    /// Authorization header format is invalid (not "Bearer {token}")
    #[error("Invalid Authorization header format")]
    InvalidAuthHeader,

    /// Token validation failed (unauthorized)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Configuration error (auth required but no secret configured)
    #[error("Auth configuration error: {0}")]
    ConfigError(String),
}

impl AuthError {
    /// Get the error code for structured error responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => error_codes::MISSING_AUTH_HEADER,
            AuthError::InvalidAuthHeader => error_codes::INVALID_AUTH_HEADER,
            AuthError::Unauthorized(_) => error_codes::UNAUTHORIZED,
            AuthError::ConfigError(_) => error_codes::CONFIG_ERROR,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = Json(json!({
            "error": self.to_string(),
            "code": self.error_code(),
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

/// Result type alias for auth operations
pub type AuthResult<T> = Result<T, AuthError>;
