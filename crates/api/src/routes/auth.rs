//! Route definitions for the `/auth` resource.

use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::{auth, sessions};
use crate::state::AppState;

/// Routes mounted at `/auth`.
///
/// ```text
/// POST   /register          -> register
/// POST   /login             -> login
/// POST   /refresh           -> refresh (refresh token in body or cookie)
/// POST   /logout            -> logout (refresh token in body or cookie)
/// POST   /logout-all        -> logout_all (requires auth)
/// POST   /forgot-password   -> forgot_password
/// POST   /reset-password    -> reset_password
/// POST   /request-otp       -> request_otp (requires auth)
/// POST   /verify-otp        -> verify_otp (auth optional)
/// GET    /me                -> me (requires auth)
/// GET    /sessions          -> sessions::list (requires auth)
/// DELETE /sessions/{id}     -> sessions::revoke (requires auth)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/logout-all", post(auth::logout_all))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password))
        .route("/request-otp", post(auth::request_otp))
        .route("/verify-otp", post(auth::verify_otp))
        .route("/me", get(auth::me))
        .route("/sessions", get(sessions::list))
        .route("/sessions/{id}", delete(sessions::revoke))
}
