use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::identity::{CallerIdentity, IdentityResolver};
use crate::verifier::TokenVerifier;

/// Turns a raw bearer token into a caller identity.
#[async_trait]
pub trait IdentitySource: Send + Sync {
    async fn identify(&self, token: &str) -> AuthResult<CallerIdentity>;

    fn name(&self) -> &'static str;
}

pub type SharedIdentitySource = Arc<dyn IdentitySource>;

/// Verifies the token signature against the provider's keys before resolving identity.
#[derive(Clone)]
pub struct CryptographicSource {
    verifier: TokenVerifier,
    resolver: IdentityResolver,
}

impl CryptographicSource {
    pub fn new(verifier: TokenVerifier) -> Self {
        Self {
            verifier,
            resolver: IdentityResolver::new(),
        }
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }
}

#[async_trait]
impl IdentitySource for CryptographicSource {
    async fn identify(&self, token: &str) -> AuthResult<CallerIdentity> {
        let claims = self.verifier.verify(token).await?;
        self.resolver.resolve(claims)
    }

    fn name(&self) -> &'static str {
        "cryptographic"
    }
}

/// Accepts `test:<subject>|<ROLES>` markers without any signature check.
///
/// Non-marker tokens go to the fallback source when one is configured.
#[derive(Clone, Default)]
pub struct StaticMarkerSource {
    resolver: IdentityResolver,
    fallback: Option<CryptographicSource>,
}

impl StaticMarkerSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(fallback: CryptographicSource) -> Self {
        Self {
            resolver: IdentityResolver::new(),
            fallback: Some(fallback),
        }
    }
}

#[async_trait]
impl IdentitySource for StaticMarkerSource {
    async fn identify(&self, token: &str) -> AuthResult<CallerIdentity> {
        if IdentityResolver::is_test_marker(token) {
            return self.resolver.resolve_test_marker(token);
        }
        match &self.fallback {
            Some(source) => source.identify(token).await,
            None => Err(AuthError::MalformedTestToken(
                "test mode only accepts 'test:<subject>|<ROLES>' tokens".into(),
            )),
        }
    }

    fn name(&self) -> &'static str {
        "static-marker"
    }
}

/// Pick the identity source once, at startup.
///
/// Outside test mode the identity provider domain is mandatory.
pub fn identity_source_from_config(config: &AuthConfig) -> AuthResult<SharedIdentitySource> {
    if config.test_mode {
        warn!("auth test mode enabled; 'test:' marker tokens bypass signature verification");
        let source = if config.domain.is_some() {
            StaticMarkerSource::with_fallback(CryptographicSource::new(
                TokenVerifier::from_config(config.clone())?,
            ))
        } else {
            StaticMarkerSource::new()
        };
        return Ok(Arc::new(source));
    }

    if config.domain.is_none() {
        return Err(AuthError::Configuration(
            "AUTH0_DOMAIN must be set unless test mode is enabled".into(),
        ));
    }
    let verifier = TokenVerifier::from_config(config.clone())?;
    Ok(Arc::new(CryptographicSource::new(verifier)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn production_config_requires_domain() {
        let err = identity_source_from_config(&AuthConfig::new())
            .err()
            .expect("missing domain");
        assert!(matches!(err, AuthError::Configuration(_)));
    }

    #[tokio::test]
    async fn production_source_never_accepts_markers() {
        let source = identity_source_from_config(&AuthConfig::for_domain("idp.example.com"))
            .expect("source");
        assert_eq!(source.name(), "cryptographic");

        let err = source
            .identify("test:abc|ADMIN")
            .await
            .expect_err("marker must not authenticate");
        assert!(matches!(err, AuthError::MalformedToken(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_mode_resolves_markers() {
        let source = identity_source_from_config(&AuthConfig::new().with_test_mode(true))
            .expect("source");
        assert_eq!(source.name(), "static-marker");

        let identity = source.identify("test:abc|MODERATOR,USER").await.expect("identity");
        assert_eq!(identity.subject, "abc");
        assert!(identity.has_role("moderator"));
        assert!(identity.has_role("USER"));
    }

    #[tokio::test]
    async fn test_mode_without_fallback_rejects_real_tokens() {
        let source = StaticMarkerSource::new();
        let err = source.identify("aaa.bbb.ccc").await.expect_err("no fallback");
        assert!(matches!(err, AuthError::MalformedTestToken(_)));
    }
}
