use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::DecodingKey;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::jwks::JwksFetcher;

/// Immutable snapshot of the identity provider's public keys, indexed by `kid`.
#[derive(Clone)]
pub struct SigningKeySet {
    keys: HashMap<String, DecodingKey>,
    fetched_at: DateTime<Utc>,
}

impl SigningKeySet {
    pub fn new<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, DecodingKey)>,
    {
        Self {
            keys: entries.into_iter().collect(),
            fetched_at: Utc::now(),
        }
    }

    pub fn get(&self, kid: &str) -> Option<&DecodingKey> {
        self.keys.get(kid)
    }

    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key ids in sorted order.
    pub fn key_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

impl fmt::Debug for SigningKeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeySet")
            .field("kids", &self.key_ids())
            .field("fetched_at", &self.fetched_at)
            .finish()
    }
}

/// Process-wide cache of the signing key set.
///
/// The first successful fetch is kept for the life of the process; there is no
/// TTL. Concurrent cold-start callers queue on a populate lock so only one of
/// them goes to the network, and a failed fetch leaves the cache empty for the
/// next caller to retry. Use [`KeySetCache::invalidate`] or
/// [`KeySetCache::refresh`] after a provider key rotation.
#[derive(Clone)]
pub struct KeySetCache {
    inner: Arc<Inner>,
}

struct Inner {
    fetcher: Option<JwksFetcher>,
    current: RwLock<Option<Arc<SigningKeySet>>>,
    populate: Mutex<()>,
}

impl KeySetCache {
    pub fn new(fetcher: JwksFetcher) -> Self {
        Self::build(Some(fetcher), None)
    }

    /// Cache with no identity provider behind it; every lookup is a configuration error.
    pub fn unconfigured() -> Self {
        Self::build(None, None)
    }

    /// Cache pre-populated with fixed keys and no remote source.
    pub fn with_keys(keys: SigningKeySet) -> Self {
        Self::build(None, Some(Arc::new(keys)))
    }

    pub fn from_config(config: &AuthConfig) -> AuthResult<Self> {
        match config.jwks_url() {
            Some(url) => Ok(Self::new(JwksFetcher::new(url)?)),
            None => Ok(Self::unconfigured()),
        }
    }

    fn build(fetcher: Option<JwksFetcher>, keys: Option<Arc<SigningKeySet>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                current: RwLock::new(keys),
                populate: Mutex::new(()),
            }),
        }
    }

    pub fn jwks_url(&self) -> Option<&str> {
        self.inner.fetcher.as_ref().map(JwksFetcher::url)
    }

    /// Currently cached set, without fetching.
    pub async fn cached(&self) -> Option<Arc<SigningKeySet>> {
        self.inner.current.read().await.clone()
    }

    pub async fn get_signing_keys(&self) -> AuthResult<Arc<SigningKeySet>> {
        if let Some(keys) = self.cached().await {
            return Ok(keys);
        }

        let fetcher = self.fetcher()?;
        let _populating = self.inner.populate.lock().await;

        // Another caller may have populated the cache while we waited.
        if let Some(keys) = self.cached().await {
            debug!(fetched_at = %keys.fetched_at(), "signing keys populated by concurrent caller");
            return Ok(keys);
        }

        let keys = Arc::new(fetcher.fetch().await?);
        *self.inner.current.write().await = Some(keys.clone());
        Ok(keys)
    }

    /// Fetch now and replace the cached set wholesale. On failure the previous set is kept.
    pub async fn refresh(&self) -> AuthResult<Arc<SigningKeySet>> {
        let fetcher = self.fetcher()?;
        let _populating = self.inner.populate.lock().await;

        let keys = Arc::new(fetcher.fetch().await?);
        *self.inner.current.write().await = Some(keys.clone());
        info!(url = fetcher.url(), count = keys.len(), fetched_at = %keys.fetched_at(), "signing keys refreshed");
        Ok(keys)
    }

    /// Drop the cached set so the next lookup fetches again.
    pub async fn invalidate(&self) {
        let _populating = self.inner.populate.lock().await;
        if self.inner.current.write().await.take().is_some() {
            info!(url = self.jwks_url().unwrap_or("-"), "signing key cache invalidated");
        }
    }

    fn fetcher(&self) -> AuthResult<&JwksFetcher> {
        self.inner.fetcher.as_ref().ok_or_else(|| {
            AuthError::Configuration("identity provider domain is not configured".into())
        })
    }
}
