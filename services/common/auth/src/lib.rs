pub mod claims;
pub mod config;
pub mod error;
pub mod extractors;
pub mod guards;
pub mod identity;
pub mod jwks;
pub mod key_cache;
pub mod policy;
pub mod roles;
pub mod source;
pub mod verifier;

#[cfg(test)]
pub(crate) mod test_support;

pub use claims::{Audience, VerifiedClaims};
pub use config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use extractors::AuthContext;
pub use guards::{ensure_authorized, ensure_role};
pub use identity::{CallerIdentity, IdentityResolver, RoleSource};
pub use jwks::JwksFetcher;
pub use key_cache::{KeySetCache, SigningKeySet};
pub use policy::{authorize, require_roles, Action, AuthorizationDecision, ResourceAuthContext};
pub use roles::{CATEGORY_ADMIN_ROLES, MODERATION_ROLES, ROLE_ADMIN, ROLE_MODERATOR, ROLE_USER};
pub use source::{
    identity_source_from_config, CryptographicSource, IdentitySource, SharedIdentitySource,
    StaticMarkerSource,
};
pub use verifier::TokenVerifier;
