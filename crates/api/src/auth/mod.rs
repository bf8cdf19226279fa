//! Authentication primitives.
//!
//! - [`password`] -- Argon2id password hashing and verification.
//! - [`jwt`] -- access/refresh token claims, signing and verification.
//! - [`tokens`] -- the session-aware token service (issue, rotate, revoke).
//! - [`cookie`] -- the refresh-token cookie.

pub mod cookie;
pub mod jwt;
pub mod password;
pub mod tokens;
