use thiserror::Error;

use crate::auth::StoreError;
use crate::utils::truncate_body;

/// Why the pipeline gave up on a session. Every variant ends in a forced logout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    NoRefreshToken,
    RefreshRejected,
    Forbidden,
    /// The server said the token is invalid, expired or revoked, or a
    /// refreshed token was still rejected.
    TokenInvalidated,
}

impl AuthFailure {
    pub fn message(&self) -> &'static str {
        match self {
            AuthFailure::NoRefreshToken => "No refresh token available",
            AuthFailure::RefreshRejected => "Token refresh failed",
            AuthFailure::Forbidden => "Access forbidden",
            AuthFailure::TokenInvalidated => "Authentication failed",
        }
    }
}

/// Surfaced to callers after the session was torn down.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", .failure.message())]
pub struct AuthenticationError {
    failure: AuthFailure,
}

impl AuthenticationError {
    pub fn new(failure: AuthFailure) -> Self {
        Self { failure }
    }

    pub fn failure(&self) -> AuthFailure {
        self.failure
    }

    pub fn message(&self) -> &'static str {
        self.failure.message()
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - credentials were rejected")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Request failed with status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Network error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Credential storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = truncate_body(body, MAX_ERROR_BODY_LENGTH);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            code => ApiError::Http {
                status: code,
                body: truncated,
            },
        }
    }

    /// The session was torn down while handling this error.
    pub fn is_authentication(&self) -> bool {
        matches!(self, ApiError::Authentication(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_mapping() {
        assert!(matches!(
            ApiError::from_status(StatusCode::NOT_FOUND, "gone"),
            ApiError::NotFound(ref b) if b == "gone"
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ApiError::RateLimited
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, "upstream"),
            ApiError::ServerError(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::UNPROCESSABLE_ENTITY, "bad"),
            ApiError::Http { status: 422, .. }
        ));
    }

    #[test]
    fn test_authentication_error_messages() {
        let err: ApiError = AuthenticationError::new(AuthFailure::RefreshRejected).into();
        assert_eq!(err.to_string(), "Token refresh failed");
        assert!(err.is_authentication());
        assert_eq!(
            AuthenticationError::new(AuthFailure::NoRefreshToken).to_string(),
            "No refresh token available"
        );
    }
}
