//! Per-request context and the response-side error finishing pass.
//!
//! [`request_context`] runs once per request, before any route. It resolves
//! the caller's IP, correlation id, optional identity and rate-limit bypass,
//! and stores them as a [`RequestContext`] extension. On the way out it
//! stamps the correlation id into every error envelope, logs 500s, and turns
//! bare error responses produced by the framework (405, 408, ...) into the
//! same envelope.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::http::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, USER_AGENT};
use axum::http::request::Parts;
use axum::http::{Extensions, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use crowdship_core::hashing::secrets_match;
use crowdship_core::roles::is_admin;
use crowdship_core::types::DbId;
use uuid::Uuid;

use crate::error::{envelope_bytes, ErrorBody, InternalDetail};
use crate::state::AppState;

pub const CORRELATION_ID_HEADER: HeaderName = HeaderName::from_static("x-correlation-id");

/// Operator header that skips rate limiting when it carries the configured
/// bypass token.
pub const BYPASS_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-bypass");

/// Identity from a valid access token. Resolved without touching the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: DbId,
    pub role: String,
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: String,
    pub ip: String,
    pub user_agent: Option<String>,
    pub caller: Option<Caller>,
    /// Set once per request; every limiter short-circuits on it.
    pub bypass_rate_limits: bool,
}

fn header_str<'a>(headers: &'a HeaderMap, name: impl axum::http::header::AsHeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// The caller's address, used as the key of every per-IP limit.
///
/// With `trusted_hops == 0` the socket peer is used and `X-Forwarded-For` is
/// ignored. Otherwise each trusted proxy is assumed to append the address it
/// saw, so the entry `trusted_hops` from the right is the client and
/// everything left of it is caller-supplied. A shorter header yields its
/// leftmost entry. Falls back to the socket peer, then `"unknown"`.
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions, trusted_hops: usize) -> String {
    (trusted_hops > 0)
        .then(|| forwarded_client(headers, trusted_hops))
        .flatten()
        .or_else(|| {
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

fn forwarded_client(headers: &HeaderMap, trusted_hops: usize) -> Option<String> {
    let hops: Vec<&str> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .collect();
    hops.get(hops.len().saturating_sub(trusted_hops))
        .map(|hop| hop.to_string())
}

/// The token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    header_str(headers, AUTHORIZATION)?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl RequestContext {
    fn basic(headers: &HeaderMap, extensions: &Extensions, trusted_hops: usize) -> Self {
        Self {
            correlation_id: header_str(headers, CORRELATION_ID_HEADER)
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            ip: client_ip(headers, extensions, trusted_hops),
            user_agent: header_str(headers, USER_AGENT).map(str::to_string),
            caller: None,
            bypass_rate_limits: false,
        }
    }

    fn resolve(headers: &HeaderMap, extensions: &Extensions, state: &AppState) -> Self {
        let mut ctx = Self::basic(headers, extensions, state.config.trust_proxy_hops);

        ctx.caller = bearer_token(headers)
            .and_then(|token| state.tokens.verify_access(token).ok())
            .map(|claims| Caller {
                user_id: claims.sub,
                role: claims.role,
            });

        let operator = match (&state.config.rate_limit.bypass_token, header_str(headers, BYPASS_HEADER)) {
            (Some(expected), Some(presented)) => secrets_match(presented, expected),
            _ => false,
        };
        let admin = ctx.caller.as_ref().is_some_and(|c| is_admin(&c.role));
        ctx.bypass_rate_limits = operator || admin;

        if ctx.bypass_rate_limits {
            tracing::debug!(
                correlation_id = %ctx.correlation_id,
                operator,
                admin,
                "Rate limits bypassed for request"
            );
        }
        ctx
    }

    pub fn user_id(&self) -> Option<DbId> {
        self.caller.as_ref().map(|c| c.user_id)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_else(|| RequestContext::basic(&parts.headers, &parts.extensions, 0)))
    }
}

/// Build the [`RequestContext`], run the request, then finish its error
/// response.
pub async fn request_context(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let ctx = RequestContext::resolve(req.headers(), req.extensions(), &state);
    req.extensions_mut().insert(ctx.clone());
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;
    finish_error(response, &ctx, &method, &path, &state)
}

fn code_for_status(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "BAD_REQUEST",
        StatusCode::UNAUTHORIZED => "UNAUTHORIZED",
        StatusCode::FORBIDDEN => "FORBIDDEN",
        StatusCode::NOT_FOUND => "NOT_FOUND",
        StatusCode::METHOD_NOT_ALLOWED => "METHOD_NOT_ALLOWED",
        StatusCode::REQUEST_TIMEOUT => "REQUEST_TIMEOUT",
        StatusCode::PAYLOAD_TOO_LARGE => "PAYLOAD_TOO_LARGE",
        StatusCode::UNSUPPORTED_MEDIA_TYPE => "UNSUPPORTED_MEDIA_TYPE",
        StatusCode::UNPROCESSABLE_ENTITY => "VALIDATION_ERROR",
        StatusCode::TOO_MANY_REQUESTS => "RATE_LIMIT_EXCEEDED",
        s if s.is_server_error() => "INTERNAL_ERROR",
        _ => "ERROR",
    }
}

fn finish_error(
    response: Response,
    ctx: &RequestContext,
    method: &Method,
    path: &str,
    state: &AppState,
) -> Response {
    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return response;
    }

    let mut body = match response.extensions().get::<ErrorBody>() {
        Some(body) => body.clone(),
        None => ErrorBody::new(
            code_for_status(status),
            status.canonical_reason().unwrap_or("Request failed"),
        ),
    };
    body.correlation_id = Some(ctx.correlation_id.clone());

    if status.is_server_error() {
        let detail = response
            .extensions()
            .get::<InternalDetail>()
            .map(|d| d.0.clone());
        tracing::error!(
            %method,
            path,
            ip = %ctx.ip,
            user_id = ?ctx.user_id(),
            correlation_id = %ctx.correlation_id,
            detail = detail.as_deref().unwrap_or("none"),
            "Request failed with internal error"
        );
        if state.config.app_env.exposes_internal_errors() {
            if let Some(detail) = detail {
                body.message = detail;
            }
        }
    }

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(CONTENT_LENGTH);
    parts
        .headers
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    parts.extensions.insert(body.clone());
    Response::from_parts(parts, Body::from(envelope_bytes(&body)))
}
