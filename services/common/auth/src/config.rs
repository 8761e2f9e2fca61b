use std::env;
use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::Algorithm;

use crate::error::{AuthError, AuthResult};

/// Signing algorithms accepted when nothing else is configured.
pub const DEFAULT_ALGORITHMS: &str = "RS256";

/// Upper bound on a single JWKS fetch.
pub const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Runtime configuration for bearer-token verification.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Identity provider domain serving the JWKS document. Required unless test mode is on.
    pub domain: Option<String>,
    /// Expected audience claim (aud). Audience is not checked when unset.
    pub audience: Option<String>,
    /// Algorithms a token header may declare.
    pub algorithms: Vec<Algorithm>,
    /// Accept `test:<subject>|<ROLES>` marker tokens.
    pub test_mode: bool,
    /// Allowable clock skew in seconds when validating exp.
    pub leeway_seconds: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            domain: None,
            audience: None,
            algorithms: vec![Algorithm::RS256],
            test_mode: false,
            leeway_seconds: 0,
        }
    }
}

impl AuthConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct config for an identity provider domain with RS256 and no audience check.
    pub fn for_domain(domain: impl Into<String>) -> Self {
        Self {
            domain: Some(normalize_domain(&domain.into())),
            ..Self::default()
        }
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Replace the algorithm allow-list from a comma-separated list such as `RS256,RS384`.
    pub fn with_algorithms(mut self, raw: &str) -> AuthResult<Self> {
        self.algorithms = parse_algorithms(raw)?;
        Ok(self)
    }

    pub fn with_test_mode(mut self, enabled: bool) -> Self {
        self.test_mode = enabled;
        self
    }

    pub fn with_leeway(mut self, seconds: u32) -> Self {
        self.leeway_seconds = seconds;
        self
    }

    pub fn jwks_url(&self) -> Option<String> {
        self.domain
            .as_deref()
            .map(|domain| format!("https://{domain}{JWKS_PATH}"))
    }

    pub fn allows(&self, algorithm: Algorithm) -> bool {
        self.algorithms.contains(&algorithm)
    }

    /// Load configuration from `AUTH0_*` / `AUTH_*` environment variables.
    pub fn from_env() -> AuthResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> AuthResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::new();
        config.domain = non_empty("AUTH0_DOMAIN").map(|value| normalize_domain(&value));
        config.audience = non_empty("AUTH0_AUDIENCE");
        if let Some(raw) = non_empty("AUTH0_ALGORITHMS") {
            config.algorithms = parse_algorithms(&raw)?;
        }
        config.test_mode = non_empty("AUTH_TEST_MODE")
            .or_else(|| non_empty("TESTING"))
            .map(|value| is_truthy(&value))
            .unwrap_or(false);
        if let Some(raw) = non_empty("AUTH_LEEWAY_SECONDS") {
            config.leeway_seconds = raw.parse().map_err(|_| {
                AuthError::Configuration(format!("AUTH_LEEWAY_SECONDS is not a number: {raw}"))
            })?;
        }
        Ok(config)
    }
}

pub fn parse_algorithms(raw: &str) -> AuthResult<Vec<Algorithm>> {
    let mut algorithms = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|name| !name.is_empty()) {
        let algorithm = Algorithm::from_str(name)
            .map_err(|_| AuthError::Configuration(format!("unsupported signing algorithm '{name}'")))?;
        if !algorithms.contains(&algorithm) {
            algorithms.push(algorithm);
        }
    }

    if algorithms.is_empty() {
        return Err(AuthError::Configuration(
            "at least one signing algorithm must be allowed".into(),
        ));
    }
    Ok(algorithms)
}

fn normalize_domain(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    without_scheme.trim_end_matches('/').to_string()
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
