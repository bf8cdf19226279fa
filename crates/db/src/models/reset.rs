//! Password-reset token model and DTOs.

use sqlx::FromRow;
use crowdship_core::types::{DbId, Timestamp};

/// A row from the `password_reset_tokens` table.
#[derive(Debug, Clone, FromRow)]
pub struct PasswordResetToken {
    pub id: DbId,
    pub user_id: DbId,
    pub token_hash: String,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub used_at: Option<Timestamp>,
}

#[derive(Debug, Clone)]
pub struct CreateResetToken {
    pub user_id: DbId,
    pub token_hash: String,
    pub expires_at: Timestamp,
}
