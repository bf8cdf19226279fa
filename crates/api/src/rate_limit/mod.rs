//! Rate limiting and brute-force protection.
//!
//! Two independent limiters coexist:
//!
//! - [`durable::AttemptLimiter`] counts rows in the attempt log. Used for the
//!   auth endpoints, where exact history and auditability matter.
//! - [`counter::CounterLimiter`] increments fixed-window counters in a
//!   volatile store (Redis or in-process). Used for the global per-IP /
//!   per-user throttle, where latency matters.
//!
//! Requests flagged with a bypass in their
//! [`RequestContext`](crate::middleware::context::RequestContext) skip both.

pub mod counter;
pub mod durable;

use axum::http::{HeaderMap, HeaderValue};
use chrono::Utc;
use crowdship_core::error::RateLimitRejection;

use crate::error::{X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET};

/// Error code for an exceeded quota.
pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";

/// Error code for an email locked by the brute-force guard.
pub const ACCOUNT_TEMPORARILY_LOCKED: &str = "ACCOUNT_TEMPORARILY_LOCKED";

/// `max` requests per `window_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateRule {
    pub max: u32,
    pub window_secs: u64,
    /// Count only failed attempts, so a legitimate retry after a typo does
    /// not compound.
    pub failures_only: bool,
}

impl RateRule {
    pub const fn new(max: u32, window_secs: u64) -> Self {
        Self {
            max,
            window_secs,
            failures_only: false,
        }
    }

    pub const fn failures_only(self) -> Self {
        Self {
            failures_only: true,
            ..self
        }
    }

    pub fn window_ms(&self) -> i64 {
        (self.window_secs as i64).saturating_mul(1000)
    }
}

/// Email-keyed lockout after repeated failed logins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BruteForceRule {
    pub max_failures: u32,
    pub window_secs: u64,
    /// Reported `retryAfter`, fixed regardless of how the failures are spread
    /// across the window.
    pub lockout_secs: u64,
}

/// Per-endpoint limits for the auth handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthLimits {
    /// Per IP.
    pub register: RateRule,
    /// Failed logins per IP.
    pub login: RateRule,
    /// Applied per email and per IP.
    pub forgot_password: RateRule,
    /// Per IP.
    pub reset_password: RateRule,
    /// Per user email.
    pub request_otp: RateRule,
    /// Failed verifications per IP, and per email when no access token is
    /// presented.
    pub verify_otp: RateRule,
    pub brute_force: BruteForceRule,
}

impl Default for AuthLimits {
    fn default() -> Self {
        Self {
            register: RateRule::new(3, 60 * 60),
            login: RateRule::new(5, 10 * 60).failures_only(),
            forgot_password: RateRule::new(3, 60 * 60),
            reset_password: RateRule::new(5, 60 * 60),
            request_otp: RateRule::new(3, 5 * 60),
            verify_otp: RateRule::new(5, 15 * 60).failures_only(),
            brute_force: BruteForceRule {
                max_failures: 10,
                window_secs: 60 * 60,
                lockout_secs: 60 * 60,
            },
        }
    }
}

/// Outcome of a limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    /// Requests left in the current window after this one.
    pub remaining: u32,
    /// Unix timestamp (seconds) when the window frees up.
    pub reset_at: i64,
    /// Seconds until a denied caller may retry. At least 1 when denied.
    pub retry_after: u64,
}

impl RateDecision {
    /// The decision used when a limiter is skipped or its store failed open.
    pub fn unlimited(rule: &RateRule) -> Self {
        Self {
            allowed: true,
            limit: rule.max,
            remaining: rule.max,
            reset_at: Utc::now().timestamp() + rule.window_secs as i64,
            retry_after: 0,
        }
    }

    pub fn rejection(&self, code: &'static str, message: impl Into<String>) -> RateLimitRejection {
        RateLimitRejection {
            code,
            message: message.into(),
            retry_after: self.retry_after.max(1),
            limit: self.limit,
            reset_at: self.reset_at,
        }
    }
}

/// Seconds from `now_ms` until `until_ms`, rounded up, at least 1.
pub(crate) fn seconds_until(now_ms: i64, until_ms: i64) -> u64 {
    let ms = (until_ms - now_ms).max(0) as u64;
    ms.div_ceil(1000).max(1)
}

/// `X-RateLimit-*` headers for an allowed request.
pub fn decision_headers(decision: &RateDecision) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(decision.reset_at));
    headers
}
