//! Global per-caller throttle over the counter limiter.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use crowdship_core::error::CoreError;

use super::context::RequestContext;
use crate::error::{AppError, X_RATELIMIT_LIMIT};
use crate::rate_limit::{decision_headers, RateRule, RATE_LIMIT_EXCEEDED};
use crate::state::AppState;

/// Count the request against `user:{id}` for callers with a valid access
/// token and `ip:{ip}` otherwise.
pub async fn throttle(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(ctx) = req.extensions().get::<RequestContext>().cloned() else {
        return next.run(req).await;
    };
    if ctx.bypass_rate_limits {
        return next.run(req).await;
    }

    let limits = state.config.rate_limit.throttle;
    let (key, rule) = match &ctx.caller {
        Some(caller) => (
            format!("user:{}", caller.user_id),
            RateRule::new(limits.authenticated_max, limits.window_secs),
        ),
        None => (
            format!("ip:{}", ctx.ip),
            RateRule::new(limits.anonymous_max, limits.window_secs),
        ),
    };

    let decision = state.throttle.check(&key, &rule).await;
    if !decision.allowed {
        tracing::warn!(key, retry_after = decision.retry_after, "Throttle limit exceeded");
        return AppError::Core(CoreError::RateLimited(
            decision.rejection(RATE_LIMIT_EXCEEDED, "Too many requests. Slow down."),
        ))
        .into_response();
    }

    let mut response = next.run(req).await;
    // Auth-endpoint rejections carry their own, stricter quota.
    if !response.headers().contains_key(X_RATELIMIT_LIMIT) {
        response.headers_mut().extend(decision_headers(&decision));
    }
    response
}
