//! Request middleware and extractors.
//!
//! - [`context::request_context`] -- correlation id, client IP, bypass flag,
//!   and the error-envelope finishing pass.
//! - [`throttle::throttle`] -- global per-IP / per-user counter throttle.
//! - [`auth::AuthUser`] -- extracts the authenticated user from a JWT Bearer token.
//! - [`validated_json::ValidatedJson`] -- JSON body with `validator` rules applied.

pub mod auth;
pub mod context;
pub mod throttle;
pub mod validated_json;
