//! Repository for the `otp_codes` table.

use sqlx::PgPool;
use crowdship_core::otp::OtpPurpose;
use crowdship_core::types::DbId;

use crate::models::otp::{CreateOtp, OtpCode};

const COLUMNS: &str = "id, user_id, code_hash, purpose, created_at, expires_at, used_at, is_used";

/// Provides OTP issue/consume operations.
pub struct OtpRepo;

impl OtpRepo {
    /// Supersede unused codes for the same user and purpose, then insert the
    /// new one. Both happen in one transaction.
    pub async fn issue(pool: &PgPool, input: &CreateOtp) -> Result<OtpCode, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            "UPDATE otp_codes SET is_used = true, used_at = NOW()
             WHERE user_id = $1 AND purpose = $2 AND NOT is_used",
        )
        .bind(input.user_id)
        .bind(input.purpose.as_str())
        .execute(&mut *tx)
        .await?;

        let query = format!(
            "INSERT INTO otp_codes (user_id, code_hash, purpose, expires_at)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        let code = sqlx::query_as::<_, OtpCode>(&query)
            .bind(input.user_id)
            .bind(&input.code_hash)
            .bind(input.purpose.as_str())
            .bind(input.expires_at)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(code)
    }

    /// Mark a matching unused, unexpired code as used and return it.
    ///
    /// Single conditional update: two concurrent verifications of the same
    /// code cannot both get a row back.
    pub async fn consume(
        pool: &PgPool,
        user_id: DbId,
        purpose: OtpPurpose,
        code_hash: &str,
    ) -> Result<Option<OtpCode>, sqlx::Error> {
        let query = format!(
            "UPDATE otp_codes SET is_used = true, used_at = NOW()
             WHERE id = (
                 SELECT id FROM otp_codes
                 WHERE user_id = $1 AND purpose = $2 AND code_hash = $3
                   AND NOT is_used AND expires_at > NOW()
                 ORDER BY created_at DESC
                 LIMIT 1
             ) AND NOT is_used
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, OtpCode>(&query)
            .bind(user_id)
            .bind(purpose.as_str())
            .bind(code_hash)
            .fetch_optional(pool)
            .await
    }
}
