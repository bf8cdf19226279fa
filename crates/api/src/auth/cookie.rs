//! The `refreshToken` cookie.
//!
//! Browsers receive the refresh token as an `HttpOnly`, `SameSite=Strict`
//! cookie scoped to `/api/auth`, so it is only ever sent to the auth
//! endpoints and never readable from script.

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use cookie::time::Duration;
use cookie::{Cookie, SameSite};

pub const REFRESH_COOKIE: &str = "refreshToken";
pub const REFRESH_COOKIE_PATH: &str = "/api/auth";

/// Build the `Set-Cookie` value carrying a fresh refresh token.
pub fn refresh_cookie(token: &str, max_age_secs: i64, secure: bool) -> String {
    Cookie::build((REFRESH_COOKIE, token.to_owned()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path(REFRESH_COOKIE_PATH)
        .max_age(Duration::seconds(max_age_secs))
        .build()
        .to_string()
}

/// Build the `Set-Cookie` value that deletes the refresh cookie.
pub fn clear_refresh_cookie(secure: bool) -> String {
    let mut cookie = Cookie::build((REFRESH_COOKIE, ""))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path(REFRESH_COOKIE_PATH)
        .build();
    cookie.make_removal();
    cookie.to_string()
}

/// Read the refresh token from the request's `Cookie` headers.
pub fn read_refresh_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|c| c.name() == REFRESH_COOKIE && !c.value().is_empty())
        .map(|c| c.value().to_string())
}

/// Header map holding a single `Set-Cookie` value, for handler responses.
pub fn set_cookie_headers(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(SET_COOKIE, value);
    }
    headers
}
