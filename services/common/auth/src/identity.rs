use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{json, Value};

use crate::claims::VerifiedClaims;
use crate::error::{AuthError, AuthResult};

const TEST_MARKER_PREFIX: &str = "test:";

/// Authenticated caller for the lifetime of one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallerIdentity {
    pub subject: String,
    /// Roles in claim order with original casing; exact duplicates removed.
    pub roles: Vec<String>,
    pub claims: VerifiedClaims,
}

impl CallerIdentity {
    pub fn new<I, R>(subject: impl Into<String>, roles: I, claims: VerifiedClaims) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for role in roles.into_iter().map(Into::into) {
            if !unique.contains(&role) {
                unique.push(role);
            }
        }
        Self {
            subject: subject.into(),
            roles: unique,
            claims,
        }
    }

    /// Case-insensitive role check.
    pub fn has_role(&self, role: &str) -> bool {
        let wanted = role.to_uppercase();
        self.roles.iter().any(|held| held.to_uppercase() == wanted)
    }

    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        roles.iter().any(|role| self.has_role(role))
    }

    /// First role the provider listed, used to stamp authored content.
    pub fn primary_role(&self) -> Option<&str> {
        self.roles.first().map(String::as_str)
    }

    /// Upper-cased role set for comparisons.
    pub fn normalized_roles(&self) -> BTreeSet<String> {
        self.roles.iter().map(|role| role.to_uppercase()).collect()
    }
}

/// Places a provider may put roles, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleSource {
    /// Top-level `roles` claim.
    DirectRoles,
    /// `roles` inside a namespaced custom claim such as `https://example.com/claims`.
    NamespacedRoles,
    /// `permissions` claim.
    PermissionsFallback,
}

impl RoleSource {
    pub const PRECEDENCE: [RoleSource; 3] = [
        RoleSource::DirectRoles,
        RoleSource::NamespacedRoles,
        RoleSource::PermissionsFallback,
    ];

    pub fn extract(self, claims: &VerifiedClaims) -> Vec<String> {
        match self {
            RoleSource::DirectRoles => claims.get("roles").map(string_list).unwrap_or_default(),
            RoleSource::NamespacedRoles => claims
                .iter()
                .filter(|(key, _)| has_uri_scheme(key))
                .filter_map(|(_, value)| value.as_object()?.get("roles"))
                .map(string_list)
                .find(|roles| !roles.is_empty())
                .unwrap_or_default(),
            RoleSource::PermissionsFallback => claims
                .get("permissions")
                .map(string_list)
                .unwrap_or_default(),
        }
    }
}

/// Turns verified claims (or a test marker) into a [`CallerIdentity`].
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver;

impl IdentityResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(&self, claims: VerifiedClaims) -> AuthResult<CallerIdentity> {
        let subject = claims
            .subject()
            .ok_or(AuthError::MissingSubject)?
            .to_string();
        let (_, roles) = self.resolve_roles(&claims);
        Ok(CallerIdentity::new(subject, roles, claims))
    }

    /// Roles from the first source that yields any, with the source that supplied them.
    pub fn resolve_roles(&self, claims: &VerifiedClaims) -> (Option<RoleSource>, Vec<String>) {
        RoleSource::PRECEDENCE
            .iter()
            .map(|source| (*source, source.extract(claims)))
            .find(|(_, roles)| !roles.is_empty())
            .map(|(source, roles)| (Some(source), roles))
            .unwrap_or((None, Vec::new()))
    }

    /// Parse `test:<subject>` or `test:<subject>|<ROLE1>,<ROLE2>` without any cryptography.
    pub fn resolve_test_marker(&self, token: &str) -> AuthResult<CallerIdentity> {
        let payload = token
            .strip_prefix(TEST_MARKER_PREFIX)
            .ok_or_else(|| AuthError::MalformedTestToken("missing 'test:' prefix".into()))?;

        let (subject, roles_part) = payload.split_once('|').unwrap_or((payload, ""));
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(AuthError::MalformedTestToken("empty subject".into()));
        }

        let roles: Vec<String> = roles_part
            .split(',')
            .map(str::trim)
            .filter(|role| !role.is_empty())
            .map(str::to_string)
            .collect();

        let claims = match json!({ "sub": subject, "roles": roles }) {
            Value::Object(map) => VerifiedClaims::from_map(map),
            _ => VerifiedClaims::default(),
        };
        Ok(CallerIdentity::new(subject, roles, claims))
    }

    pub fn is_test_marker(token: &str) -> bool {
        token.starts_with(TEST_MARKER_PREFIX)
    }
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(single) if !single.is_empty() => vec![single.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn has_uri_scheme(key: &str) -> bool {
    match key.split_once("://") {
        Some((scheme, _)) => {
            let mut chars = scheme.chars();
            chars.next().is_some_and(|first| first.is_ascii_alphabetic())
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}
