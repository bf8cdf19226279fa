//! Repository for the `user_sessions` table.

use sqlx::PgPool;
use crowdship_core::sessions::RevokeReason;
use crowdship_core::types::{DbId, SessionId};

use crate::models::session::{CreateSession, UserSession};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, user_id, refresh_token_hash, user_agent, ip_address, device_name, \
                        created_at, last_accessed_at, expires_at, revoked_at, revoked_reason, \
                        is_active";

/// Predicate for a session that may still be used.
const VALID: &str = "is_active AND revoked_at IS NULL AND expires_at > NOW()";

/// Provides session-store operations.
pub struct SessionRepo;

impl SessionRepo {
    /// Insert a new session, returning the created row.
    pub async fn create(pool: &PgPool, input: &CreateSession) -> Result<UserSession, sqlx::Error> {
        let query = format!(
            "INSERT INTO user_sessions
                (id, user_id, refresh_token_hash, expires_at, user_agent, ip_address, device_name)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, UserSession>(&query)
            .bind(input.id)
            .bind(input.user_id)
            .bind(&input.refresh_token_hash)
            .bind(input.expires_at)
            .bind(&input.user_agent)
            .bind(&input.ip_address)
            .bind(&input.device_name)
            .fetch_one(pool)
            .await
    }

    /// Find a session by id regardless of its state.
    pub async fn find_by_id(
        pool: &PgPool,
        id: SessionId,
    ) -> Result<Option<UserSession>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM user_sessions WHERE id = $1");
        sqlx::query_as::<_, UserSession>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List a user's valid sessions, most recently used first.
    pub async fn list_active_for_user(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Vec<UserSession>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM user_sessions
             WHERE user_id = $1 AND {VALID}
             ORDER BY last_accessed_at DESC"
        );
        sqlx::query_as::<_, UserSession>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Atomically retire the valid session holding `hash` for rotation.
    ///
    /// The check and the flip happen in one statement, so of two concurrent
    /// callers presenting the same token exactly one receives the row.
    pub async fn claim_for_rotation(
        pool: &PgPool,
        hash: &str,
    ) -> Result<Option<UserSession>, sqlx::Error> {
        let query = format!(
            "UPDATE user_sessions
             SET is_active = false, revoked_at = NOW(), revoked_reason = $2,
                 last_accessed_at = NOW()
             WHERE refresh_token_hash = $1 AND {VALID}
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, UserSession>(&query)
            .bind(hash)
            .bind(RevokeReason::Rotated.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Revoke the session holding `hash` if it is still active.
    /// Returns `true` if a row changed.
    pub async fn revoke_by_hash(
        pool: &PgPool,
        hash: &str,
        reason: RevokeReason,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE user_sessions
             SET is_active = false, revoked_at = NOW(), revoked_reason = $2
             WHERE refresh_token_hash = $1 AND is_active",
        )
        .bind(hash)
        .bind(reason.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Revoke one of `user_id`'s sessions. Returns `true` if a row changed.
    pub async fn revoke(
        pool: &PgPool,
        id: SessionId,
        user_id: DbId,
        reason: RevokeReason,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE user_sessions
             SET is_active = false, revoked_at = NOW(), revoked_reason = $3
             WHERE id = $1 AND user_id = $2 AND is_active",
        )
        .bind(id)
        .bind(user_id)
        .bind(reason.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Revoke all active sessions for a user. Returns the count of revoked sessions.
    pub async fn revoke_all_for_user(
        pool: &PgPool,
        user_id: DbId,
        reason: RevokeReason,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE user_sessions
             SET is_active = false, revoked_at = NOW(), revoked_reason = $2
             WHERE user_id = $1 AND is_active",
        )
        .bind(user_id)
        .bind(reason.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete sessions past their expiry. Revoked-but-unexpired rows are kept
    /// so replay of a rotated token is still recognised.
    pub async fn cleanup_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at < NOW()")
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
