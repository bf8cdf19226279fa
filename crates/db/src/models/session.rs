//! Refresh-token session model and DTOs.

use sqlx::FromRow;
use crowdship_core::sessions::RevokeReason;
use crowdship_core::types::{DbId, SessionId, Timestamp};

/// A session row from the `user_sessions` table.
#[derive(Debug, Clone, FromRow)]
pub struct UserSession {
    pub id: SessionId,
    pub user_id: DbId,
    /// SHA-256 of the refresh token; the raw token is never stored.
    pub refresh_token_hash: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub device_name: Option<String>,
    pub created_at: Timestamp,
    pub last_accessed_at: Timestamp,
    pub expires_at: Timestamp,
    pub revoked_at: Option<Timestamp>,
    pub revoked_reason: Option<String>,
    pub is_active: bool,
}

impl UserSession {
    /// A session is usable only while active, unrevoked and unexpired.
    pub fn is_valid_at(&self, now: Timestamp) -> bool {
        self.is_active && self.revoked_at.is_none() && self.expires_at > now
    }

    /// Whether this session was superseded by a refresh.
    pub fn was_rotated(&self) -> bool {
        self.revoked_reason.as_deref() == Some(RevokeReason::Rotated.as_str())
    }
}

/// DTO for creating a new session. The id is chosen by the caller because it
/// is embedded in the tokens before the row exists.
#[derive(Debug, Clone)]
pub struct CreateSession {
    pub id: SessionId,
    pub user_id: DbId,
    pub refresh_token_hash: String,
    pub expires_at: Timestamp,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub device_name: Option<String>,
}
