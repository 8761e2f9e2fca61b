use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AuthError, AuthResult};

/// Claim mapping taken from a token whose signature has been verified.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct VerifiedClaims(Map<String, Value>);

impl VerifiedClaims {
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Decode a base64url payload segment. Only call once the signature has been checked.
    pub(crate) fn from_payload_segment(segment: &str) -> AuthResult<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(segment.trim_end_matches('='))
            .map_err(|err| AuthError::MalformedToken(format!("payload is not base64url: {err}")))?;
        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|err| AuthError::MalformedToken(format!("payload is not JSON: {err}")))?;
        Self::try_from(value)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn subject(&self) -> Option<&str> {
        self.0
            .get("sub")
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Raw `exp` in seconds since the epoch, if present.
    pub fn expiry_seconds(&self) -> AuthResult<Option<f64>> {
        match self.0.get("exp") {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_f64()
                .map(Some)
                .ok_or_else(|| AuthError::MalformedToken(format!("exp claim is not numeric: {value}"))),
        }
    }

    pub fn expires_at(&self) -> AuthResult<Option<DateTime<Utc>>> {
        match self.expiry_seconds()? {
            None => Ok(None),
            Some(seconds) => Utc
                .timestamp_opt(seconds.floor() as i64, 0)
                .single()
                .map(Some)
                .ok_or_else(|| AuthError::MalformedToken(format!("exp out of range: {seconds}"))),
        }
    }

    pub fn audience(&self) -> Option<Audience> {
        self.0
            .get("aud")
            .and_then(|value| Audience::deserialize(value).ok())
    }
}

impl TryFrom<Value> for VerifiedClaims {
    type Error = AuthError;

    fn try_from(value: Value) -> AuthResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(AuthError::MalformedToken(format!(
                "claims must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

/// The `aud` claim, which providers emit either as a string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, expected: &str) -> bool {
        match self {
            Audience::Single(value) => value == expected,
            Audience::Many(values) => values.iter().any(|value| value == expected),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
