//! Attempt-log rows and window queries.

use sqlx::FromRow;
use crowdship_core::attempts::AttemptKind;
use crowdship_core::types::{DbId, Timestamp};

/// A row from the append-only `login_attempts` table.
#[derive(Debug, Clone, FromRow)]
pub struct LoginAttempt {
    pub id: DbId,
    pub kind: String,
    pub ip_address: String,
    pub email: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub created_at: Timestamp,
}

/// DTO for appending an attempt.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub kind: AttemptKind,
    pub ip_address: String,
    pub email: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub failure_reason: Option<&'static str>,
    pub created_at: Timestamp,
}

/// The column an aggregate query is keyed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptKey {
    Ip(String),
    Email(String),
}

/// Count attempts of `kind` matching `key` created at or after `since`.
#[derive(Debug, Clone)]
pub struct AttemptQuery {
    pub kind: AttemptKind,
    pub key: AttemptKey,
    /// Count only `success = false` rows.
    pub failures_only: bool,
    pub since: Timestamp,
}

/// Aggregate result of an [`AttemptQuery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttemptWindow {
    pub count: i64,
    /// Oldest matching row in the window, used to compute when it frees up.
    pub oldest: Option<Timestamp>,
}
