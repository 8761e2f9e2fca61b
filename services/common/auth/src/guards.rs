use tracing::warn;

use crate::error::AuthResult;
use crate::extractors::AuthContext;
use crate::policy::{authorize, require_roles, Action, ResourceAuthContext};

/// Reject the request unless the caller holds one of `allowed` (case-insensitive).
pub fn ensure_role(auth: &AuthContext, allowed: &[&str]) -> AuthResult<()> {
    if allowed.is_empty() {
        return Ok(());
    }

    let decision = require_roles(&auth.identity, allowed);
    if !decision.is_allowed() {
        warn!(subject = auth.subject(), ?allowed, roles = ?auth.identity.roles, "role_check_failed");
    }
    decision.into_result()
}

/// Reject the request unless the policy permits `action` on the resource.
pub fn ensure_authorized(
    auth: &AuthContext,
    action: Action,
    resource: Option<&ResourceAuthContext>,
) -> AuthResult<()> {
    let decision = authorize(&auth.identity, action, resource);
    if !decision.is_allowed() {
        warn!(
            subject = auth.subject(),
            ?action,
            owner = resource.map(|r| r.owner_subject.as_str()).unwrap_or("-"),
            reason = decision.reason.as_deref().unwrap_or("-"),
            "authorization_denied"
        );
    }
    decision.into_result()
}
