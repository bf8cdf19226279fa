//! Repository for the append-only `login_attempts` table.

use sqlx::PgPool;
use crowdship_core::types::Timestamp;

use crate::models::attempt::{AttemptKey, AttemptQuery, AttemptWindow, NewAttempt};

/// Provides attempt-log operations.
pub struct AttemptRepo;

impl AttemptRepo {
    /// Append one attempt.
    pub async fn record(pool: &PgPool, input: &NewAttempt) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO login_attempts
                (kind, ip_address, email, user_agent, success, failure_reason, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(input.kind.as_str())
        .bind(&input.ip_address)
        .bind(&input.email)
        .bind(&input.user_agent)
        .bind(input.success)
        .bind(input.failure_reason)
        .bind(input.created_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Count matching rows in the window and report the oldest one.
    pub async fn window(pool: &PgPool, q: &AttemptQuery) -> Result<AttemptWindow, sqlx::Error> {
        let (column, value) = match &q.key {
            AttemptKey::Ip(ip) => ("ip_address", ip.as_str()),
            AttemptKey::Email(email) => ("email", email.as_str()),
        };
        let failures = if q.failures_only {
            " AND success = false"
        } else {
            ""
        };
        let query = format!(
            "SELECT COUNT(*), MIN(created_at) FROM login_attempts
             WHERE kind = $1 AND {column} = $2 AND created_at >= $3{failures}"
        );
        let (count, oldest): (i64, Option<Timestamp>) = sqlx::query_as(&query)
            .bind(q.kind.as_str())
            .bind(value)
            .bind(q.since)
            .fetch_one(pool)
            .await?;
        Ok(AttemptWindow { count, oldest })
    }

    /// Delete rows created before `cutoff`. Returns the count of deleted rows.
    pub async fn delete_older_than(pool: &PgPool, cutoff: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM login_attempts WHERE created_at < $1")
            .bind(cutoff)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
