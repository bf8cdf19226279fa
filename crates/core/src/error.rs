use serde::Serialize;

/// One field-level validation failure, surfaced in the error envelope's
/// `details` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A request rejected by a rate limit or lockout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRejection {
    /// Envelope error code (`RATE_LIMIT_EXCEEDED`, `ACCOUNT_TEMPORARILY_LOCKED`).
    pub code: &'static str,
    pub message: String,
    /// Seconds until the caller may try again. Always at least 1.
    pub retry_after: u64,
    /// The quota that was exceeded.
    pub limit: u32,
    /// Unix timestamp (seconds) at which the window resets.
    pub reset_at: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed on {} field(s)", .0.len())]
    InvalidFields(Vec<FieldError>),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Unknown email and wrong password both map here so callers cannot
    /// tell which one failed.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Invalid session")]
    InvalidSession,

    /// Wrong, expired or already-used one-time code.
    #[error("Invalid or expired code")]
    InvalidCode,

    /// Wrong, expired or already-used password-reset token.
    #[error("Invalid or expired reset token")]
    InvalidResetToken,

    #[error("Account is inactive")]
    AccountInactive,

    #[error("Rate limited: {}", .0.message)]
    RateLimited(RateLimitRejection),
}
