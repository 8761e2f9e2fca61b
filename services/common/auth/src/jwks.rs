use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::DecodingKey;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::JWKS_FETCH_TIMEOUT;
use crate::error::{AuthError, AuthResult};
use crate::key_cache::SigningKeySet;

/// Fetches the identity provider's published signing keys.
#[derive(Clone)]
pub struct JwksFetcher {
    client: Client,
    url: String,
}

impl JwksFetcher {
    /// Fetcher for `url` whose requests are bounded by [`JWKS_FETCH_TIMEOUT`].
    pub fn new(url: impl Into<String>) -> AuthResult<Self> {
        let client = Client::builder()
            .timeout(JWKS_FETCH_TIMEOUT)
            .build()
            .map_err(|err| AuthError::Configuration(format!("failed to build JWKS client: {err}")))?;
        Ok(Self::with_client(client, url))
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn fetch(&self) -> AuthResult<SigningKeySet> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|err| AuthError::KeyFetch(err.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::KeyFetch(format!(
                "HTTP {} from {}",
                response.status(),
                self.url
            )));
        }

        let body: JwksResponse = response
            .json()
            .await
            .map_err(|err| AuthError::KeyFetch(format!("invalid JWKS document: {err}")))?;

        let mut keys = Vec::new();
        for entry in body.keys.into_iter() {
            match decode_entry(entry) {
                Ok(pair) => keys.push(pair),
                Err(reason) => warn!(url = %self.url, %reason, "skipping JWKS entry"),
            }
        }

        if keys.is_empty() {
            return Err(AuthError::KeyFetch(format!(
                "no usable signing keys published at {}",
                self.url
            )));
        }

        let set = SigningKeySet::new(keys);
        info!(url = %self.url, kids = ?set.key_ids(), "fetched signing keys");
        Ok(set)
    }
}

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<Value>,
}

fn decode_entry(entry: Value) -> Result<(String, DecodingKey), String> {
    let kid = entry
        .get("kid")
        .and_then(Value::as_str)
        .filter(|kid| !kid.is_empty())
        .ok_or_else(|| "entry missing key id (kid)".to_string())?
        .to_string();

    let jwk: Jwk = serde_json::from_value(entry)
        .map_err(|err| format!("key '{kid}' is not a supported JWK: {err}"))?;
    let key = DecodingKey::from_jwk(&jwk)
        .map_err(|err| format!("key '{kid}' has unusable material: {err}"))?;
    Ok((kid, key))
}
