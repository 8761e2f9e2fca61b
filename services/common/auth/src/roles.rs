pub const ROLE_ADMIN: &str = "ADMIN";
pub const ROLE_MODERATOR: &str = "MODERATOR";
pub const ROLE_USER: &str = "USER";

/// Roles allowed to moderate content they do not own.
pub const MODERATION_ROLES: &[&str] = &[ROLE_MODERATOR, ROLE_ADMIN];

/// Roles allowed to manage categories.
pub const CATEGORY_ADMIN_ROLES: &[&str] = &[ROLE_ADMIN];
