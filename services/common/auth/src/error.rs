use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("auth configuration error: {0}")]
    Configuration(String),
    #[error("failed to fetch JWKS: {0}")]
    KeyFetch(String),
    #[error("no signing key registered for kid '{0}'")]
    KeyNotFound(String),
    #[error("invalid token signature: {0}")]
    SignatureInvalid(String),
    #[error("token expired")]
    TokenExpired,
    #[error("token audience does not match")]
    AudienceMismatch,
    #[error("malformed token: {0}")]
    MalformedToken(String),
    #[error("token missing subject")]
    MissingSubject,
    #[error("invalid test token format: {0}")]
    MalformedTestToken(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("authorization header missing")]
    MissingAuthorization,
    #[error("authorization header malformed")]
    InvalidAuthorization,
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Configuration(_) => "AUTH_CONFIG",
            AuthError::KeyFetch(_) => "AUTH_JWKS",
            AuthError::KeyNotFound(_) => "AUTH_KEY",
            AuthError::SignatureInvalid(_) => "AUTH_SIGNATURE",
            AuthError::TokenExpired => "AUTH_EXPIRED",
            AuthError::AudienceMismatch => "AUTH_AUDIENCE",
            AuthError::MalformedToken(_) => "AUTH_TOKEN",
            AuthError::MissingSubject => "AUTH_SUBJECT",
            AuthError::MalformedTestToken(_) => "AUTH_TEST_TOKEN",
            AuthError::PermissionDenied(_) => "AUTH_FORBIDDEN",
            AuthError::MissingAuthorization | AuthError::InvalidAuthorization => "AUTH_HEADER",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
        };
        let mut response = (status, Json(body)).into_response();
        response.headers_mut().insert(
            "X-Error-Code",
            axum::http::HeaderValue::from_static(self.code()),
        );
        response
    }
}
