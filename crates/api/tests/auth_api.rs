//! HTTP-level integration tests for the `/api/auth` endpoints.
//!
//! Tests cover registration, login, refresh-token rotation and reuse
//! detection, logout, password reset, one-time codes, session management,
//! the auth-endpoint rate limits and the brute-force lockout. Every test runs
//! against in-memory stores through the production middleware stack.

mod common;

use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, RETRY_AFTER, SET_COOKIE};
use axum::http::{Method, Request, StatusCode};
use chrono::Utc;
use std::net::SocketAddr;

use common::{
    access_token, body_bytes, body_json, build_test_app, build_test_app_with, refresh_token, test_config, TestApp,
    BYPASS_TOKEN, TEST_PASSWORD,
};
use crowdship_api::config::ServerConfig;
use crowdship_api::auth::password::hash_password;
use crowdship_api::handlers::auth::FORGOT_PASSWORD_MESSAGE;
use crowdship_core::attempts::{failure, AttemptKind};
use crowdship_core::roles::ROLE_ADMIN;
use crowdship_db::models::attempt::NewAttempt;
use crowdship_db::models::user::{CreateProfile, CreateUser};
use crowdship_db::store::{AttemptLog, UserStore};
use crowdship_events::AuthNotice;
use serde_json::json;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// POST a login with a fixed correlation id, from a fixed IP.
async fn login_with_correlation(app: &TestApp, email: &str, password: &str, correlation_id: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .send(
            Request::builder()
                .method(Method::POST)
                .uri("/api/auth/login")
                .header(CONTENT_TYPE, "application/json")
                .header("x-forwarded-for", "192.0.2.50")
                .header("x-correlation-id", correlation_id)
                .body(Body::from(json!({ "email": email, "password": password }).to_string()))
                .unwrap(),
        )
        .await;
    (response.status(), body_bytes(response).await)
}

async fn failed_login_from(app: &TestApp, ip: &str) -> axum::http::Response<Body> {
    app.post_json_from(
        "/api/auth/login",
        json!({ "email": "nobody@example.com", "password": "Wrong1234" }),
        ip,
    )
    .await
}

async fn refresh_with(app: &TestApp, token: &str) -> axum::http::Response<Body> {
    app.post_json("/api/auth/refresh", json!({ "refreshToken": token }))
        .await
}

fn failed_login_row(email: &str, n: u32) -> NewAttempt {
    NewAttempt {
        kind: AttemptKind::Login,
        ip_address: format!("10.1.0.{n}"),
        email: Some(email.to_string()),
        user_agent: None,
        success: false,
        failure_reason: Some(failure::WRONG_PASSWORD),
        created_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// Registration and login
// ---------------------------------------------------------------------------

#[tokio::test]
async fn register_then_login_issues_distinct_sessions() {
    let app = build_test_app();

    let registered = app.register("New.User@Example.com", "new_user").await;
    assert_eq!(registered["success"], true);
    assert_eq!(registered["data"]["user"]["email"], "new.user@example.com");
    assert_eq!(registered["data"]["user"]["role"], "user");
    assert_eq!(registered["data"]["tokens"]["tokenType"], "Bearer");
    assert!(registered["data"]["user"].get("passwordHash").is_none());

    let logged_in = app.login("new.user@example.com", TEST_PASSWORD).await;
    assert_eq!(logged_in["data"]["user"]["id"], registered["data"]["user"]["id"]);
    assert_ne!(access_token(&logged_in), refresh_token(&logged_in));
    assert_ne!(refresh_token(&logged_in), refresh_token(&registered));
    assert_ne!(logged_in["data"]["sessionId"], registered["data"]["sessionId"]);
    assert!(logged_in["data"]["user"]["lastLoginAt"].is_string());
}

#[tokio::test]
async fn login_sets_http_only_refresh_cookie() {
    let app = build_test_app();
    app.register("cookie@example.com", "cookie_user").await;

    let response = app
        .post_json(
            "/api/auth/login",
            json!({ "email": "cookie@example.com", "password": TEST_PASSWORD }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response.headers()[SET_COOKIE].to_str().unwrap().to_string();
    assert!(cookie.starts_with("refreshToken="));
    assert!(cookie.contains("HttpOnly"));
}

#[tokio::test]
async fn unknown_email_and_wrong_password_are_indistinguishable() {
    let app = build_test_app();
    app.register("known@example.com", "known_user").await;

    let unknown = login_with_correlation(&app, "ghost@example.com", "Wrong1234", "corr-fixed").await;
    let wrong = login_with_correlation(&app, "known@example.com", "Wrong1234", "corr-fixed").await;

    assert_eq!(unknown.0, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown, wrong);
    let json: serde_json::Value = serde_json::from_slice(&wrong.1).unwrap();
    assert_eq!(json["error"]["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn inactive_account_cannot_log_in() {
    let app = build_test_app();
    let registered = app.register("inactive@example.com", "inactive_user").await;
    let id = registered["data"]["user"]["id"].as_i64().unwrap();
    assert!(app.store.set_user_active(id, false));

    let response = app
        .post_json(
            "/api/auth/login",
            json!({ "email": "inactive@example.com", "password": TEST_PASSWORD }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"]["code"], "ACCOUNT_INACTIVE");
}

#[tokio::test]
async fn register_reports_invalid_fields() {
    let app = build_test_app();

    let response = app
        .post_json(
            "/api/auth/register",
            json!({ "email": "not-an-email", "password": "short", "username": "ok_name" }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
    let fields: Vec<&str> = json["error"]["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, ["email", "password"]);
}

#[tokio::test]
async fn duplicate_registration_names_the_conflicting_field() {
    let app = build_test_app();
    app.register("taken@example.com", "taken_name").await;

    let same_email = app
        .post_json_from(
            "/api/auth/register",
            json!({ "email": "TAKEN@example.com", "password": TEST_PASSWORD, "username": "other_name" }),
            "192.0.2.10",
        )
        .await;
    assert_eq!(same_email.status(), StatusCode::CONFLICT);
    let json = body_json(same_email).await;
    assert_eq!(json["error"]["code"], "CONFLICT");
    assert_eq!(json["error"]["details"][0]["field"], "email");

    let same_username = app
        .post_json_from(
            "/api/auth/register",
            json!({ "email": "fresh@example.com", "password": TEST_PASSWORD, "username": "taken_name" }),
            "192.0.2.11",
        )
        .await;
    assert_eq!(same_username.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(same_username).await["error"]["details"][0]["field"], "username");
}

// ---------------------------------------------------------------------------
// Refresh rotation and logout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn refresh_token_rotates_exactly_once() {
    let app = build_test_app();
    let registered = app.register("rotate@example.com", "rotator").await;
    let first = refresh_token(&registered);

    let rotated = refresh_with(&app, &first).await;
    assert_eq!(rotated.status(), StatusCode::OK);
    let second = refresh_token(&body_json(rotated).await);
    assert_ne!(first, second);

    let replay = refresh_with(&app, &first).await;
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(replay).await["error"]["code"], "INVALID_SESSION");

    // The replay revoked the whole family, including the fresh token.
    let after_reuse = refresh_with(&app, &second).await;
    assert_eq!(after_reuse.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_reads_the_cookie_when_body_is_empty() {
    let app = build_test_app();
    let registered = app.register("jar@example.com", "cookie_jar").await;

    let response = app
        .post_with_cookie("/api/auth/refresh", &refresh_token(&registered))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["user"]["email"], "jar@example.com");
}

#[tokio::test]
async fn refresh_without_token_is_rejected() {
    let app = build_test_app();

    let response = app.post_json("/api/auth/refresh", json!({})).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"]["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn logout_is_idempotent_and_kills_the_refresh_token() {
    let app = build_test_app();
    let registered = app.register("bye@example.com", "bye_user").await;
    let token = refresh_token(&registered);

    for _ in 0..2 {
        let response = app
            .post_json("/api/auth/logout", json!({ "refreshToken": token }))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[SET_COOKIE]
            .to_str()
            .unwrap()
            .contains("Max-Age=0"));
    }

    assert_eq!(refresh_with(&app, &token).await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_all_revokes_every_session() {
    let app = build_test_app();
    let registered = app.register("all@example.com", "all_user").await;
    let second = app.login("all@example.com", TEST_PASSWORD).await;

    let response = app
        .post_json_auth("/api/auth/logout-all", json!({}), &access_token(&second))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["revokedSessions"], 2);

    for token in [refresh_token(&registered), refresh_token(&second)] {
        assert_eq!(refresh_with(&app, &token).await.status(), StatusCode::UNAUTHORIZED);
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sessions_can_be_listed_and_revoked_by_owner_only() {
    let app = build_test_app();
    let first = app.register("owner@example.com", "owner").await;
    let second = app.login("owner@example.com", TEST_PASSWORD).await;
    let other = app.register("other@example.com", "other").await;

    let listed = body_json(app.get_auth("/api/auth/sessions", &access_token(&second)).await).await;
    let sessions = listed["data"].as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions.iter().filter(|s| s["current"] == true).count(), 1);
    assert!(sessions.iter().all(|s| s.get("refreshTokenHash").is_none()));

    let first_id = first["data"]["sessionId"].as_str().unwrap();
    let foreign = app
        .delete_auth(&format!("/api/auth/sessions/{first_id}"), &access_token(&other))
        .await;
    assert_eq!(foreign.status(), StatusCode::NOT_FOUND);

    let own = app
        .delete_auth(&format!("/api/auth/sessions/{first_id}"), &access_token(&second))
        .await;
    assert_eq!(own.status(), StatusCode::OK);

    let listed = body_json(app.get_auth("/api/auth/sessions", &access_token(&second)).await).await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);
    assert_eq!(refresh_with(&app, &refresh_token(&first)).await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_requires_a_bearer_token() {
    let app = build_test_app();

    let response = app.get("/api/auth/me").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"]["code"], "UNAUTHORIZED");

    let response = app.get_auth("/api/auth/me", "not-a-jwt").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"]["code"], "INVALID_TOKEN");
}

// ---------------------------------------------------------------------------
// Password reset
// ---------------------------------------------------------------------------

#[tokio::test]
async fn forgot_password_does_not_reveal_account_existence() {
    let app = build_test_app();
    app.register("exists@example.com", "exists").await;

    let known = body_json(
        app.post_json("/api/auth/forgot-password", json!({ "email": "exists@example.com" }))
            .await,
    )
    .await;
    let unknown = body_json(
        app.post_json("/api/auth/forgot-password", json!({ "email": "missing@example.com" }))
            .await,
    )
    .await;

    assert_eq!(known, unknown);
    assert_eq!(known["data"]["message"], FORGOT_PASSWORD_MESSAGE);
    assert_eq!(app.notifier.sent().len(), 1);
}

#[tokio::test]
async fn reset_password_consumes_token_and_revokes_sessions() {
    let app = build_test_app();
    let registered = app.register("reset@example.com", "resetter").await;

    app.post_json("/api/auth/forgot-password", json!({ "email": "reset@example.com" }))
        .await;
    let Some(AuthNotice::PasswordReset { token, .. }) = app.notifier.last_for("reset@example.com") else {
        panic!("reset token should have been delivered");
    };

    let body = json!({ "token": token, "newPassword": "Brand3NewPass" });
    let response = app.post_json("/api/auth/reset-password", body.clone()).await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(
        refresh_with(&app, &refresh_token(&registered)).await.status(),
        StatusCode::UNAUTHORIZED
    );
    app.login("reset@example.com", "Brand3NewPass").await;

    let reused = app.post_json("/api/auth/reset-password", body).await;
    assert_eq!(reused.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(reused).await["error"]["code"], "INVALID_RESET_TOKEN");
}

#[tokio::test]
async fn reset_password_rejects_inactive_account() {
    let app = build_test_app();
    let registered = app.register("dormant@example.com", "dormant").await;
    let id = registered["data"]["user"]["id"].as_i64().unwrap();

    app.post_json("/api/auth/forgot-password", json!({ "email": "dormant@example.com" }))
        .await;
    let Some(AuthNotice::PasswordReset { token, .. }) = app.notifier.last_for("dormant@example.com") else {
        panic!("reset token should have been delivered");
    };
    assert!(app.store.set_user_active(id, false));

    let response = app
        .post_json(
            "/api/auth/reset-password",
            json!({ "token": token, "newPassword": "Brand3NewPass" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"]["code"], "ACCOUNT_INACTIVE");

    // The old password still stands.
    assert!(app.store.set_user_active(id, true));
    app.login("dormant@example.com", TEST_PASSWORD).await;
}

// ---------------------------------------------------------------------------
// One-time codes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn otp_code_verifies_once_and_marks_email_verified() {
    let app = build_test_app();
    let registered = app.register("otp@example.com", "otp_user").await;
    let token = access_token(&registered);

    let issued = body_json(
        app.post_json_auth("/api/auth/request-otp", json!({ "purpose": "email_verify" }), &token)
            .await,
    )
    .await;
    let code = issued["data"]["code"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 6);
    assert!(matches!(
        app.notifier.last_for("otp@example.com"),
        Some(AuthNotice::OneTimeCode { .. })
    ));

    let body = json!({ "code": code, "purpose": "email_verify" });
    let first = app.post_json_auth("/api/auth/verify-otp", body.clone(), &token).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(body_json(first).await["data"]["verified"], true);

    let second = app.post_json_auth("/api/auth/verify-otp", body, &token).await;
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(second).await["error"]["code"], "INVALID_CODE");

    let me = body_json(app.get_auth("/api/auth/me", &token).await).await;
    assert_eq!(me["data"]["user"]["emailVerified"], true);
}

#[tokio::test]
async fn otp_code_for_one_purpose_does_not_verify_another() {
    let app = build_test_app();
    let registered = app.register("purpose@example.com", "purpose_user").await;
    let token = access_token(&registered);

    let issued = body_json(
        app.post_json_auth("/api/auth/request-otp", json!({ "purpose": "2fa" }), &token)
            .await,
    )
    .await;
    let code = issued["data"]["code"].as_str().unwrap();

    let response = app
        .post_json(
            "/api/auth/verify-otp",
            json!({ "email": "purpose@example.com", "code": code, "purpose": "email_verify" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn otp_for_inactive_account_is_rejected() {
    let app = build_test_app();
    let registered = app.register("paused@example.com", "paused_user").await;
    let id = registered["data"]["user"]["id"].as_i64().unwrap();
    let token = access_token(&registered);

    let issued = body_json(
        app.post_json_auth("/api/auth/request-otp", json!({ "purpose": "email_verify" }), &token)
            .await,
    )
    .await;
    let code = issued["data"]["code"].as_str().unwrap().to_string();
    assert!(app.store.set_user_active(id, false));

    let response = app
        .post_json(
            "/api/auth/verify-otp",
            json!({ "email": "paused@example.com", "code": code, "purpose": "email_verify" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"]["code"], "ACCOUNT_INACTIVE");
}

// ---------------------------------------------------------------------------
// Rate limits and lockout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sixth_failed_login_from_one_ip_is_rate_limited() {
    let app = build_test_app();

    for _ in 0..5 {
        let response = failed_login_from(&app, "192.0.2.77").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = failed_login_from(&app, "192.0.2.77").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response.headers()[RETRY_AFTER].to_str().unwrap().parse().unwrap();
    assert!(retry_after > 0 && retry_after <= 600);
    assert_eq!(response.headers()["x-ratelimit-limit"], "5");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "RATE_LIMIT_EXCEEDED");
    assert_eq!(json["error"]["retryAfter"], retry_after);

    // Other clients are unaffected.
    assert_eq!(failed_login_from(&app, "192.0.2.78").await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn forwarded_for_is_ignored_without_trusted_proxies() {
    let app = build_test_app_with(ServerConfig {
        trust_proxy_hops: 0,
        ..test_config()
    });
    let peer = SocketAddr::from(([192, 0, 2, 50], 41000));
    let login = json!({ "email": "nobody@example.com", "password": "Wrong1234" });

    for n in 0..5 {
        let forged = format!("203.0.113.{n}");
        let response = app.post_json_via("/api/auth/login", login.clone(), peer, &forged).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = app
        .post_json_via("/api/auth/login", login.clone(), peer, "203.0.113.99")
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let other_peer = SocketAddr::from(([192, 0, 2, 51], 41000));
    let response = app
        .post_json_via("/api/auth/login", login, other_peer, "203.0.113.99")
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn hops_left_of_the_trusted_proxy_are_ignored() {
    // One trusted proxy: only its appended entry identifies the client.
    let app = build_test_app();
    let proxy = SocketAddr::from(([10, 0, 0, 2], 443));
    let login = json!({ "email": "nobody@example.com", "password": "Wrong1234" });

    for n in 0..5 {
        let chain = format!("203.0.113.{n}, 192.0.2.60");
        let response = app.post_json_via("/api/auth/login", login.clone(), proxy, &chain).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = app
        .post_json_via("/api/auth/login", login, proxy, "203.0.113.200, 192.0.2.60")
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn otp_guesses_without_token_are_limited_per_email() {
    let app = build_test_app();
    app.register("target@example.com", "target").await;
    let guess = json!({ "email": "target@example.com", "code": "123456", "purpose": "email_verify" });

    for n in 0..5 {
        let ip = format!("192.0.2.{}", 100 + n);
        let response = app.post_json_from("/api/auth/verify-otp", guess.clone(), &ip).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], "INVALID_CODE");
    }

    let response = app
        .post_json_from("/api/auth/verify-otp", guess, "192.0.2.200")
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_json(response).await["error"]["code"], "RATE_LIMIT_EXCEEDED");
}

#[tokio::test]
async fn tenth_failure_locks_the_account() {
    let app = build_test_app();
    app.register("victim@example.com", "victim").await;

    for n in 0..9 {
        app.store.record(&failed_login_row("victim@example.com", n)).await.unwrap();
    }
    app.login("victim@example.com", TEST_PASSWORD).await;

    app.store.record(&failed_login_row("victim@example.com", 9)).await.unwrap();
    let response = app
        .post_json(
            "/api/auth/login",
            json!({ "email": "victim@example.com", "password": TEST_PASSWORD }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "ACCOUNT_TEMPORARILY_LOCKED");
    assert_eq!(json["error"]["retryAfter"], 3600);
}

#[tokio::test]
async fn bypass_token_skips_auth_limits() {
    let app = build_test_app();

    for _ in 0..7 {
        let response = app
            .send(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/auth/login")
                    .header(CONTENT_TYPE, "application/json")
                    .header("x-forwarded-for", "192.0.2.99")
                    .header("x-ratelimit-bypass", BYPASS_TOKEN)
                    .body(Body::from(
                        json!({ "email": "nobody@example.com", "password": "Wrong1234" }).to_string(),
                    ))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn admin_requests_skip_auth_limits() {
    let app = build_test_app();
    app.store
        .create_with_profile(
            &CreateUser {
                email: "admin@example.com".into(),
                username: "admin".into(),
                password_hash: hash_password(TEST_PASSWORD).unwrap(),
                role: ROLE_ADMIN.into(),
            },
            &CreateProfile::default(),
        )
        .await
        .unwrap();
    let admin = access_token(&app.login("admin@example.com", TEST_PASSWORD).await);
    let user = access_token(&app.register("plain@example.com", "plain").await);

    for _ in 0..4 {
        let response = app
            .post_json_auth("/api/auth/request-otp", json!({}), &admin)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    for _ in 0..3 {
        let response = app.post_json_auth("/api/auth/request-otp", json!({}), &user).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = app.post_json_auth("/api/auth/request-otp", json!({}), &user).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

// ---------------------------------------------------------------------------
// Correlation ids
// ---------------------------------------------------------------------------

#[tokio::test]
async fn error_body_carries_the_response_correlation_id() {
    let app = build_test_app();

    let response = app.get("/api/auth/me").await;

    let header = response.headers()["x-correlation-id"].to_str().unwrap().to_string();
    assert!(!header.is_empty());
    assert_eq!(body_json(response).await["error"]["correlationId"], header);
}

#[tokio::test]
async fn caller_supplied_correlation_id_is_echoed() {
    let app = build_test_app();

    let (status, body) = login_with_correlation(&app, "ghost@example.com", "Wrong1234", "trace-abc-123").await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"]["correlationId"], "trace-abc-123");
}
