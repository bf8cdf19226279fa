//! Limiter over the durable attempt log, and the email-keyed brute-force
//! guard built on it.

use std::sync::Arc;

use chrono::{Duration, Utc};
use crowdship_core::attempts::AttemptKind;
use crowdship_core::error::{CoreError, RateLimitRejection};
use crowdship_core::types::Timestamp;
use crowdship_db::models::attempt::{AttemptKey, AttemptQuery, AttemptWindow, NewAttempt};
use crowdship_db::store::AttemptLog;
use crowdship_db::StoreError;

use super::{
    seconds_until, BruteForceRule, RateDecision, RateRule, ACCOUNT_TEMPORARILY_LOCKED,
    RATE_LIMIT_EXCEEDED,
};
use crate::error::AppResult;
use crate::middleware::context::RequestContext;

/// Sliding-window limiter computed from attempt-log rows.
#[derive(Clone)]
pub struct AttemptLimiter {
    log: Arc<dyn AttemptLog>,
    fail_open: bool,
}

/// Allowed while `count < max`; the window frees up when its oldest row ages
/// out.
fn decide(window: AttemptWindow, rule: &RateRule, now: Timestamp) -> RateDecision {
    let count = u32::try_from(window.count).unwrap_or(u32::MAX);
    let now_ms = now.timestamp_millis();
    let reset_ms = window
        .oldest
        .map(|oldest| oldest.timestamp_millis() + rule.window_ms())
        .unwrap_or(now_ms + rule.window_ms());
    let allowed = count < rule.max;

    RateDecision {
        allowed,
        limit: rule.max,
        remaining: rule.max.saturating_sub(count.saturating_add(1)),
        reset_at: reset_ms.div_euclid(1000),
        retry_after: if allowed { 0 } else { seconds_until(now_ms, reset_ms) },
    }
}

impl AttemptLimiter {
    pub fn new(log: Arc<dyn AttemptLog>, fail_open: bool) -> Self {
        Self { log, fail_open }
    }

    /// Check `key` against `rule` as of now.
    pub async fn check(
        &self,
        kind: AttemptKind,
        key: AttemptKey,
        rule: &RateRule,
    ) -> Result<RateDecision, StoreError> {
        self.check_at(kind, key, rule, Utc::now()).await
    }

    /// Check `key` against `rule` as of `now`.
    pub async fn check_at(
        &self,
        kind: AttemptKind,
        key: AttemptKey,
        rule: &RateRule,
        now: Timestamp,
    ) -> Result<RateDecision, StoreError> {
        let query = AttemptQuery {
            kind,
            key,
            failures_only: rule.failures_only,
            since: now - Duration::seconds(rule.window_secs as i64),
        };
        let window = self.log.window(&query).await?;
        Ok(decide(window, rule, now))
    }

    /// Reject the request if `key` is over quota.
    ///
    /// A store failure follows the configured fail-open policy.
    pub async fn enforce(
        &self,
        ctx: &RequestContext,
        kind: AttemptKind,
        key: AttemptKey,
        rule: &RateRule,
    ) -> AppResult<()> {
        if ctx.bypass_rate_limits {
            return Ok(());
        }

        match self.check(kind, key.clone(), rule).await {
            Ok(decision) if decision.allowed => Ok(()),
            Ok(decision) => {
                tracing::warn!(
                    kind = %kind,
                    key = ?key,
                    retry_after = decision.retry_after,
                    "Attempt limit exceeded"
                );
                Err(CoreError::RateLimited(
                    decision.rejection(RATE_LIMIT_EXCEEDED, "Too many attempts. Try again later."),
                )
                .into())
            }
            Err(err) => self.on_store_failure(kind, rule, err),
        }
    }

    fn on_store_failure(&self, kind: AttemptKind, rule: &RateRule, err: StoreError) -> AppResult<()> {
        if self.fail_open {
            tracing::warn!(kind = %kind, error = %err, "Attempt log unavailable, failing open");
            Ok(())
        } else {
            tracing::error!(kind = %kind, error = %err, "Attempt log unavailable, failing closed");
            let decision = RateDecision {
                allowed: false,
                ..RateDecision::unlimited(rule)
            };
            Err(CoreError::RateLimited(decision.rejection(
                RATE_LIMIT_EXCEEDED,
                "Rate limiting is temporarily unavailable",
            ))
            .into())
        }
    }

    /// Lockout for `email` as of `now`, if it has reached the failure
    /// threshold.
    pub async fn lockout_at(
        &self,
        email: &str,
        rule: &BruteForceRule,
        now: Timestamp,
    ) -> Result<Option<RateLimitRejection>, StoreError> {
        let query = AttemptQuery {
            kind: AttemptKind::Login,
            key: AttemptKey::Email(email.to_string()),
            failures_only: true,
            since: now - Duration::seconds(rule.window_secs as i64),
        };
        let window = self.log.window(&query).await?;
        if window.count < i64::from(rule.max_failures) {
            return Ok(None);
        }

        Ok(Some(RateLimitRejection {
            code: ACCOUNT_TEMPORARILY_LOCKED,
            message: "Too many failed login attempts. Account temporarily locked.".into(),
            retry_after: rule.lockout_secs,
            limit: rule.max_failures,
            reset_at: now.timestamp() + rule.lockout_secs as i64,
        }))
    }

    /// Reject the login if `email` is locked out.
    pub async fn enforce_lockout(
        &self,
        ctx: &RequestContext,
        email: &str,
        rule: &BruteForceRule,
    ) -> AppResult<()> {
        if ctx.bypass_rate_limits {
            return Ok(());
        }

        match self.lockout_at(email, rule, Utc::now()).await {
            Ok(None) => Ok(()),
            Ok(Some(rejection)) => {
                tracing::warn!(email, ip = %ctx.ip, "Login rejected: account temporarily locked");
                Err(CoreError::RateLimited(rejection).into())
            }
            Err(err) => {
                let rule = RateRule::new(rule.max_failures, rule.window_secs);
                self.on_store_failure(AttemptKind::Login, &rule, err)
            }
        }
    }

    /// Append an attempt. Failures are logged, never surfaced: losing one
    /// row only makes the limiter slightly more lenient.
    pub async fn record(&self, attempt: NewAttempt) {
        if let Err(err) = self.log.record(&attempt).await {
            tracing::error!(kind = %attempt.kind, error = %err, "Failed to record attempt");
        }
    }
}

/// Build an attempt row stamped with the caller's IP and user agent.
pub fn attempt(
    ctx: &RequestContext,
    kind: AttemptKind,
    email: Option<&str>,
    outcome: Result<(), &'static str>,
) -> NewAttempt {
    NewAttempt {
        kind,
        ip_address: ctx.ip.clone(),
        email: email.map(str::to_string),
        user_agent: ctx.user_agent.clone(),
        success: outcome.is_ok(),
        failure_reason: outcome.err(),
        created_at: Utc::now(),
    }
}
