#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE};
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use crowdship_api::auth::jwt::JwtConfig;
use crowdship_api::config::{AppEnv, RateLimitConfig, ServerConfig, ThrottleConfig};
use crowdship_api::rate_limit::counter::MemoryCounterStore;
use crowdship_api::router::build_app_router;
use crowdship_api::state::AppState;
use crowdship_db::memory::MemoryStore;
use crowdship_db::Stores;
use crowdship_events::MemoryNotifier;

pub const TEST_PASSWORD: &str = "Sup3rSecret";
pub const BYPASS_TOKEN: &str = "operator-bypass-token";

/// Registration is limited per IP, so every helper registration gets its own.
static NEXT_IP: AtomicU32 = AtomicU32::new(1);

/// Build a test `ServerConfig` with safe defaults.
///
/// The global throttle is generous so it never interferes with the
/// auth-endpoint limits under test.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        app_env: AppEnv::Test,
        // Requests are built as if relayed by one proxy; `x-forwarded-for`
        // carries the client address.
        trust_proxy_hops: 1,
        redis_url: None,
        jwt: JwtConfig {
            access_secret: "test-access-secret".to_string(),
            refresh_secret: "test-refresh-secret".to_string(),
            access_token_expiry_mins: 15,
            refresh_token_expiry_days: 7,
        },
        rate_limit: RateLimitConfig {
            fail_open: true,
            bypass_token: Some(BYPASS_TOKEN.to_string()),
            throttle: ThrottleConfig {
                window_secs: 60,
                anonymous_max: 10_000,
                authenticated_max: 10_000,
            },
            ..RateLimitConfig::default()
        },
        refresh_cookie_secure: false,
        session_cleanup_interval_secs: 3600,
        attempt_retention_days: 30,
    }
}

/// The application router plus handles on its in-memory backends.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<MemoryNotifier>,
}

/// Build the full application router with all middleware layers over
/// in-memory stores, counters and notifier.
///
/// Uses the same [`build_app_router`] as `main.rs`, so integration tests
/// exercise the production middleware stack.
pub fn build_test_app() -> TestApp {
    build_test_app_with(test_config())
}

pub fn build_test_app_with(config: ServerConfig) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(MemoryNotifier::new());
    let state = AppState::new(
        config,
        Stores::from_backend(store.clone()),
        Arc::new(MemoryCounterStore::new()),
        notifier.clone(),
    );

    TestApp {
        router: build_app_router(state),
        store,
        notifier,
    }
}

impl TestApp {
    /// Send one request through a clone of the router.
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(request(Method::GET, uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn get_auth(&self, uri: &str, token: &str) -> Response<Body> {
        self.send(
            request(Method::GET, uri)
                .header(AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// POST a JSON body from the default test IP.
    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> Response<Body> {
        self.post_json_from(uri, body, "203.0.113.1").await
    }

    /// POST a JSON body as if from client address `ip`.
    pub async fn post_json_from(&self, uri: &str, body: serde_json::Value, ip: &str) -> Response<Body> {
        self.send(
            json_request(Method::POST, uri)
                .header("x-forwarded-for", ip)
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// POST a JSON body over a connection from `peer`, carrying whatever
    /// `x-forwarded-for` the caller chose to send.
    pub async fn post_json_via(
        &self,
        uri: &str,
        body: serde_json::Value,
        peer: SocketAddr,
        forwarded_for: &str,
    ) -> Response<Body> {
        self.send(
            json_request(Method::POST, uri)
                .extension(ConnectInfo(peer))
                .header("x-forwarded-for", forwarded_for)
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn post_json_auth(&self, uri: &str, body: serde_json::Value, token: &str) -> Response<Body> {
        self.send(
            json_request(Method::POST, uri)
                .header(AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// POST with no body and the given refresh cookie.
    pub async fn post_with_cookie(&self, uri: &str, refresh_token: &str) -> Response<Body> {
        self.send(
            request(Method::POST, uri)
                .header(COOKIE, format!("refreshToken={refresh_token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn delete_auth(&self, uri: &str, token: &str) -> Response<Body> {
        self.send(
            request(Method::DELETE, uri)
                .header(AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// Register `email`/`username` from its own IP and return the response
    /// body.
    pub async fn register(&self, email: &str, username: &str) -> serde_json::Value {
        let ip = format!("198.51.100.{}", NEXT_IP.fetch_add(1, Ordering::Relaxed));
        let response = self
            .post_json_from(
                "/api/auth/register",
                serde_json::json!({
                    "email": email,
                    "password": TEST_PASSWORD,
                    "username": username,
                }),
                &ip,
            )
            .await;
        assert_eq!(response.status(), 201, "registration of {email} should succeed");
        body_json(response).await
    }

    /// Log in and return the response body.
    pub async fn login(&self, email: &str, password: &str) -> serde_json::Value {
        let response = self
            .post_json(
                "/api/auth/login",
                serde_json::json!({ "email": email, "password": password }),
            )
            .await;
        assert_eq!(response.status(), 200, "login of {email} should succeed");
        body_json(response).await
    }
}

fn request(method: Method, uri: &str) -> axum::http::request::Builder {
    Request::builder().method(method).uri(uri)
}

fn json_request(method: Method, uri: &str) -> axum::http::request::Builder {
    request(method, uri).header(CONTENT_TYPE, "application/json")
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

/// `data.tokens.accessToken` of an auth payload.
pub fn access_token(body: &serde_json::Value) -> String {
    body["data"]["tokens"]["accessToken"].as_str().unwrap().to_string()
}

/// `data.tokens.refreshToken` of an auth payload.
pub fn refresh_token(body: &serde_json::Value) -> String {
    body["data"]["tokens"]["refreshToken"].as_str().unwrap().to_string()
}
