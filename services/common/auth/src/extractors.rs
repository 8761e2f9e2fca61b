use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header::AUTHORIZATION, request::Parts};

use crate::error::{AuthError, AuthResult};
use crate::identity::CallerIdentity;
use crate::source::SharedIdentitySource;

/// Extracts the caller identity from the request using the configured identity source.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub identity: CallerIdentity,
    pub token: String,
}

impl AuthContext {
    pub fn subject(&self) -> &str {
        &self.identity.subject
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.identity.has_role(role)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    SharedIdentitySource: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let source = SharedIdentitySource::from_ref(state);

        let header_value = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthorization)?;

        let token = parse_bearer(header_value)?;
        let identity = source.identify(&token).await?;

        Ok(Self { identity, token })
    }
}

fn parse_bearer(value: &axum::http::HeaderValue) -> AuthResult<String> {
    let raw = value
        .to_str()
        .map_err(|_| AuthError::InvalidAuthorization)?
        .trim();

    let (scheme, token) = raw
        .split_once(' ')
        .ok_or(AuthError::InvalidAuthorization)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidAuthorization);
    }
    let token = token.trim();

    if token.is_empty() {
        return Err(AuthError::InvalidAuthorization);
    }

    Ok(token.to_owned())
}
