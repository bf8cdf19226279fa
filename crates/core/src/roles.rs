//! Well-known role name constants.
//!
//! These must match the `chk_users_role` constraint in the users migration.
//! `admin` is the only role with extra capability today: its requests skip
//! rate limiting.

pub const ROLE_USER: &str = "user";
pub const ROLE_ADMIN: &str = "admin";

/// Whether `role` carries administrative privileges.
pub fn is_admin(role: &str) -> bool {
    role == ROLE_ADMIN
}
