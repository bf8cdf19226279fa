//! Repository for the `password_reset_tokens` table.

use sqlx::PgPool;

use crate::models::reset::{CreateResetToken, PasswordResetToken};

const COLUMNS: &str = "id, user_id, token_hash, created_at, expires_at, used_at";

/// Provides password-reset token operations.
pub struct ResetTokenRepo;

impl ResetTokenRepo {
    /// Retire outstanding tokens for the user and insert a new one.
    pub async fn create(
        pool: &PgPool,
        input: &CreateResetToken,
    ) -> Result<PasswordResetToken, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            "UPDATE password_reset_tokens SET used_at = NOW()
             WHERE user_id = $1 AND used_at IS NULL",
        )
        .bind(input.user_id)
        .execute(&mut *tx)
        .await?;

        let query = format!(
            "INSERT INTO password_reset_tokens (user_id, token_hash, expires_at)
             VALUES ($1, $2, $3)
             RETURNING {COLUMNS}"
        );
        let token = sqlx::query_as::<_, PasswordResetToken>(&query)
            .bind(input.user_id)
            .bind(&input.token_hash)
            .bind(input.expires_at)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(token)
    }

    /// Mark the token used if it is unused and unexpired, returning it.
    pub async fn consume(
        pool: &PgPool,
        token_hash: &str,
    ) -> Result<Option<PasswordResetToken>, sqlx::Error> {
        let query = format!(
            "UPDATE password_reset_tokens SET used_at = NOW()
             WHERE token_hash = $1 AND used_at IS NULL AND expires_at > NOW()
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PasswordResetToken>(&query)
            .bind(token_hash)
            .fetch_optional(pool)
            .await
    }
}
