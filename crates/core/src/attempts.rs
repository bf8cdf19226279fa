//! Attempt-log vocabulary shared by the store and the durable limiter.

use std::fmt;

/// Which auth operation an attempt-log row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptKind {
    Login,
    Register,
    ForgotPassword,
    ResetPassword,
    OtpRequest,
    OtpVerify,
}

impl AttemptKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Register => "register",
            Self::ForgotPassword => "forgot_password",
            Self::ResetPassword => "reset_password",
            Self::OtpRequest => "otp_request",
            Self::OtpVerify => "otp_verify",
        }
    }
}

impl fmt::Display for AttemptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reasons recorded with unsuccessful attempts.
pub mod failure {
    pub const UNKNOWN_EMAIL: &str = "unknown_email";
    pub const WRONG_PASSWORD: &str = "wrong_password";
    pub const ACCOUNT_INACTIVE: &str = "account_inactive";
    pub const CONFLICT: &str = "conflict";
    pub const INVALID_CODE: &str = "invalid_code";
    pub const INVALID_TOKEN: &str = "invalid_token";
}
