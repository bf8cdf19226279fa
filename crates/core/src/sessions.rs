//! Session revocation vocabulary.

use std::fmt;

/// Why a session stopped being usable. Persisted in
/// `user_sessions.revoked_reason`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeReason {
    /// Superseded by a new session on refresh.
    Rotated,
    Logout,
    LogoutAll,
    PasswordReset,
    /// A refresh token that had already been rotated was presented again.
    ReuseDetected,
    /// Revoked from the session-management endpoint.
    UserRevoked,
}

impl RevokeReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rotated => "rotated",
            Self::Logout => "logout",
            Self::LogoutAll => "logout_all",
            Self::PasswordReset => "password_reset",
            Self::ReuseDetected => "reuse_detected",
            Self::UserRevoked => "user_revoked",
        }
    }
}

impl fmt::Display for RevokeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
