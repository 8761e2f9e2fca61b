use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::{crypto, decode_header};
use tracing::debug;

use crate::claims::VerifiedClaims;
use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::key_cache::KeySetCache;

/// Verifies bearer tokens against the cached signing key set.
///
/// Checks run in a fixed order and each one is a hard gate: header, key lookup,
/// signature, then (only on a trusted payload) expiry and audience.
#[derive(Clone)]
pub struct TokenVerifier {
    config: Arc<AuthConfig>,
    keys: KeySetCache,
}

impl TokenVerifier {
    pub fn new(config: AuthConfig, keys: KeySetCache) -> Self {
        Self {
            config: Arc::new(config),
            keys,
        }
    }

    pub fn from_config(config: AuthConfig) -> AuthResult<Self> {
        let keys = KeySetCache::from_config(&config)?;
        Ok(Self::new(config, keys))
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn key_cache(&self) -> &KeySetCache {
        &self.keys
    }

    pub async fn verify(&self, token: &str) -> AuthResult<VerifiedClaims> {
        self.verify_at(token, Utc::now()).await
    }

    pub async fn verify_at(&self, token: &str, now: DateTime<Utc>) -> AuthResult<VerifiedClaims> {
        let segments = TokenSegments::split(token)?;

        let header = decode_header(token)
            .map_err(|err| AuthError::MalformedToken(format!("undecodable header: {err}")))?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::KeyNotFound("<none>".into()))?;

        let keys = self.keys.get_signing_keys().await?;
        let key = keys
            .get(&kid)
            .ok_or_else(|| AuthError::KeyNotFound(kid.clone()))?;

        if !self.config.allows(header.alg) {
            return Err(AuthError::SignatureInvalid(format!(
                "algorithm {:?} is not allowed",
                header.alg
            )));
        }
        let valid = crypto::verify(
            segments.signature,
            segments.signing_input.as_bytes(),
            key,
            header.alg,
        )
        .map_err(|err| AuthError::SignatureInvalid(err.to_string()))?;
        if !valid {
            return Err(AuthError::SignatureInvalid("signature does not match".into()));
        }

        let claims = VerifiedClaims::from_payload_segment(segments.payload)?;
        self.check_expiry(&claims, now)?;
        self.check_audience(&claims)?;

        debug!(
            kid = %kid,
            subject = claims.subject().unwrap_or("-"),
            expires_at = ?claims.expires_at().ok().flatten(),
            "verified bearer token"
        );
        Ok(claims)
    }

    fn check_expiry(&self, claims: &VerifiedClaims, now: DateTime<Utc>) -> AuthResult<()> {
        if let Some(exp) = claims.expiry_seconds()? {
            let now_seconds = now.timestamp_millis() as f64 / 1000.0;
            if now_seconds > exp + f64::from(self.config.leeway_seconds) {
                return Err(AuthError::TokenExpired);
            }
        }
        Ok(())
    }

    fn check_audience(&self, claims: &VerifiedClaims) -> AuthResult<()> {
        let expected = match self.config.audience.as_deref() {
            Some(expected) => expected,
            None => return Ok(()),
        };

        match claims.audience() {
            Some(audience) if audience.contains(expected) => Ok(()),
            _ => Err(AuthError::AudienceMismatch),
        }
    }
}

/// The three dot-separated parts of a compact JWS.
struct TokenSegments<'a> {
    signing_input: &'a str,
    payload: &'a str,
    signature: &'a str,
}

impl<'a> TokenSegments<'a> {
    fn split(token: &'a str) -> AuthResult<Self> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(AuthError::MalformedToken(format!(
                "expected 3 segments, found {}",
                parts.len()
            )));
        }
        if parts.iter().any(|part| part.is_empty()) {
            return Err(AuthError::MalformedToken("empty token segment".into()));
        }

        let (signing_input, signature) = token
            .rsplit_once('.')
            .ok_or_else(|| AuthError::MalformedToken("missing signature".into()))?;
        Ok(Self {
            signing_input,
            payload: parts[1],
            signature,
        })
    }
}
