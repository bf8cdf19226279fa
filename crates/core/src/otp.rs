//! One-time codes and single-use reset tokens.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Number of digits in every OTP code.
pub const OTP_LENGTH: usize = 6;

/// OTP lifetime in minutes.
pub const OTP_TTL_MINS: i64 = 10;

/// Password-reset token lifetime in minutes.
pub const RESET_TOKEN_TTL_MINS: i64 = 60;

/// Length of a generated password-reset token.
const RESET_TOKEN_LENGTH: usize = 48;

/// What an OTP code may be used for. A code issued for one purpose never
/// verifies for another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OtpPurpose {
    #[serde(rename = "2fa")]
    TwoFactor,
    #[serde(rename = "email_verify")]
    EmailVerify,
    #[serde(rename = "password_reset")]
    PasswordReset,
}

impl OtpPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TwoFactor => "2fa",
            Self::EmailVerify => "email_verify",
            Self::PasswordReset => "password_reset",
        }
    }
}

impl fmt::Display for OtpPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OtpPurpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "2fa" => Ok(Self::TwoFactor),
            "email_verify" => Ok(Self::EmailVerify),
            "password_reset" => Ok(Self::PasswordReset),
            other => Err(format!("unknown OTP purpose '{other}'")),
        }
    }
}

/// Generate a zero-padded 6-digit numeric code.
pub fn generate_otp_code() -> String {
    let n: u32 = rand::rng().random_range(0..1_000_000);
    format!("{n:0width$}", width = OTP_LENGTH)
}

/// Whether `code` has the fixed OTP shape (exactly six ASCII digits).
pub fn is_well_formed_code(code: &str) -> bool {
    code.len() == OTP_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}

/// Generate an opaque alphanumeric password-reset token.
pub fn generate_reset_token() -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(RESET_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}
