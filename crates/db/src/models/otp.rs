//! One-time code model and DTOs.

use sqlx::FromRow;
use crowdship_core::otp::OtpPurpose;
use crowdship_core::types::{DbId, Timestamp};

/// A row from the `otp_codes` table.
#[derive(Debug, Clone, FromRow)]
pub struct OtpCode {
    pub id: DbId,
    pub user_id: DbId,
    pub code_hash: String,
    pub purpose: String,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub used_at: Option<Timestamp>,
    pub is_used: bool,
}

/// DTO for issuing a code. Issuing supersedes unused codes for the same
/// user and purpose.
#[derive(Debug, Clone)]
pub struct CreateOtp {
    pub user_id: DbId,
    pub code_hash: String,
    pub purpose: OtpPurpose,
    pub expires_at: Timestamp,
}
