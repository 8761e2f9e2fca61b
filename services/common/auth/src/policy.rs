use serde::Serialize;

use crate::error::{AuthError, AuthResult};
use crate::identity::CallerIdentity;
use crate::roles::{CATEGORY_ADMIN_ROLES, MODERATION_ROLES, ROLE_ADMIN, ROLE_MODERATOR};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Edit,
    Delete,
    Hide,
    CreateCategory,
}

/// Ownership metadata for the resource being acted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceAuthContext {
    pub owner_subject: String,
    pub owner_role: Option<String>,
}

impl ResourceAuthContext {
    pub fn new(owner_subject: impl Into<String>, owner_role: Option<String>) -> Self {
        Self {
            owner_subject: owner_subject.into(),
            owner_role,
        }
    }

    fn owned_by_admin(&self) -> bool {
        self.owner_role
            .as_deref()
            .is_some_and(|role| role.to_uppercase() == ROLE_ADMIN)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationDecision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl AuthorizationDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    pub fn into_result(self) -> AuthResult<()> {
        if self.allowed {
            Ok(())
        } else {
            Err(AuthError::PermissionDenied(
                self.reason.unwrap_or_else(|| "permission denied".into()),
            ))
        }
    }
}

/// Decide whether `caller` may perform `action`. Pure; first matching rule wins.
///
/// A caller holding MODERATOR is refused edit/delete on ADMIN-authored content
/// even when it also holds ADMIN, because the rule keys on role presence.
pub fn authorize(
    caller: &CallerIdentity,
    action: Action,
    context: Option<&ResourceAuthContext>,
) -> AuthorizationDecision {
    match action {
        Action::CreateCategory => require_roles(caller, CATEGORY_ADMIN_ROLES),
        Action::Hide => require_roles(caller, MODERATION_ROLES),
        Action::Edit | Action::Delete => match context {
            Some(resource) => authorize_owned(caller, action, resource),
            None => require_roles(caller, MODERATION_ROLES),
        },
    }
}

fn authorize_owned(
    caller: &CallerIdentity,
    action: Action,
    resource: &ResourceAuthContext,
) -> AuthorizationDecision {
    if caller.has_role(ROLE_MODERATOR) && resource.owned_by_admin() {
        return AuthorizationDecision::deny(match action {
            Action::Edit => "moderators cannot edit admin content",
            _ => "moderators cannot delete admin content",
        });
    }

    if caller.subject == resource.owner_subject || caller.has_any_role(MODERATION_ROLES) {
        AuthorizationDecision::allow()
    } else {
        AuthorizationDecision::deny("not permitted")
    }
}

/// Generic role gate: allowed when the caller holds any of `allowed`, ignoring case.
pub fn require_roles(caller: &CallerIdentity, allowed: &[&str]) -> AuthorizationDecision {
    if caller.has_any_role(allowed) {
        AuthorizationDecision::allow()
    } else {
        AuthorizationDecision::deny(format!(
            "missing permission; requires one of: {}",
            allowed
                .iter()
                .map(|role| role.to_uppercase())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }
}
