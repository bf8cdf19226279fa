use crowdship_core::otp::OtpPurpose;
use serde::Serialize;

/// A message addressed to one account holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthNotice {
    /// A single-use password-reset token.
    PasswordReset {
        email: String,
        token: String,
        expires_in_mins: i64,
    },
    /// A six-digit one-time code.
    OneTimeCode {
        email: String,
        code: String,
        purpose: OtpPurpose,
        expires_in_mins: i64,
    },
}

impl AuthNotice {
    /// Recipient address.
    pub fn recipient(&self) -> &str {
        match self {
            Self::PasswordReset { email, .. } | Self::OneTimeCode { email, .. } => email,
        }
    }

    /// Short label used for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PasswordReset { .. } => "password_reset",
            Self::OneTimeCode { .. } => "one_time_code",
        }
    }

    pub fn subject(&self) -> String {
        match self {
            Self::PasswordReset { .. } => "[Crowdship] Reset your password".to_string(),
            Self::OneTimeCode { purpose, .. } => match purpose {
                OtpPurpose::EmailVerify => "[Crowdship] Verify your email".to_string(),
                OtpPurpose::TwoFactor => "[Crowdship] Your sign-in code".to_string(),
                OtpPurpose::PasswordReset => "[Crowdship] Your password reset code".to_string(),
            },
        }
    }

    /// Plain-text body. Contains the secret, so never log it.
    pub fn body(&self) -> String {
        match self {
            Self::PasswordReset {
                token,
                expires_in_mins,
                ..
            } => format!(
                "Use this token to reset your password: {token}\n\
                 It expires in {expires_in_mins} minutes and can be used once.\n\
                 If you did not ask for a reset, ignore this message."
            ),
            Self::OneTimeCode {
                code,
                expires_in_mins,
                ..
            } => format!(
                "Your code is {code}.\nIt expires in {expires_in_mins} minutes and can be used once."
            ),
        }
    }
}
