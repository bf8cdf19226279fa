use std::str::FromStr;

use crate::auth::jwt::JwtConfig;
use crate::rate_limit::AuthLimits;

/// Deployment environment, from `APP_ENV`. Unset means production, so a
/// deployment that forgets it never leaks codes or internal detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppEnv {
    Development,
    Test,
    #[default]
    Production,
}

impl AppEnv {
    /// Internal error detail is only ever shown to clients in development.
    pub fn exposes_internal_errors(self) -> bool {
        self == Self::Development
    }

    /// One-time codes are echoed in responses everywhere except production.
    pub fn echoes_otp_codes(self) -> bool {
        self != Self::Production
    }
}

impl FromStr for AppEnv {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown APP_ENV '{other}'")),
        }
    }
}

/// Global per-caller throttle applied to every `/api` route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleConfig {
    pub window_secs: u64,
    /// Requests per window keyed by IP, for callers without a valid access
    /// token.
    pub anonymous_max: u32,
    /// Requests per window keyed by user id.
    pub authenticated_max: u32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            anonymous_max: 100,
            authenticated_max: 300,
        }
    }
}

/// Rate limiting policy.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Let requests through when a limiter's backing store is unreachable.
    pub fail_open: bool,
    /// Operator token that skips every limiter when presented in
    /// `X-RateLimit-Bypass`. Disabled when `None`.
    pub bypass_token: Option<String>,
    pub throttle: ThrottleConfig,
    pub auth: AuthLimits,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            fail_open: true,
            bypass_token: None,
            throttle: ThrottleConfig::default(),
            auth: AuthLimits::default(),
        }
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development, except
/// the JWT secrets which must always be provided.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Graceful shutdown timeout in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    pub app_env: AppEnv,
    /// Reverse proxies in front of the server whose `X-Forwarded-For`
    /// entries are trusted (default: `0`, key limits on the socket peer).
    pub trust_proxy_hops: usize,
    /// Redis for the global throttle. In-process counters when unset.
    pub redis_url: Option<String>,
    /// JWT token configuration (secrets, expiry durations).
    pub jwt: JwtConfig,
    pub rate_limit: RateLimitConfig,
    /// Mark the refresh cookie `Secure` (default: `true`).
    pub refresh_cookie_secure: bool,
    /// How often expired sessions and old attempts are purged (default: `3600`).
    pub session_cleanup_interval_secs: u64,
    /// Attempt-log rows older than this are purged (default: `30`).
    pub attempt_retention_days: i64,
}

fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|e| panic!("{key} is invalid ('{raw}'): {e}")),
        Err(_) => default,
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default                 |
    /// |---------------------------------|-------------------------|
    /// | `HOST`                          | `0.0.0.0`               |
    /// | `PORT`                          | `3000`                  |
    /// | `CORS_ORIGINS`                  | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`          | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`         | `30`                    |
    /// | `APP_ENV`                       | `production`            |
    /// | `TRUST_PROXY_HOPS`              | `0`                     |
    /// | `REDIS_URL`                     | unset                   |
    /// | `RATE_LIMIT_FAIL_OPEN`          | `true`                  |
    /// | `RATE_LIMIT_BYPASS_TOKEN`       | unset                   |
    /// | `THROTTLE_WINDOW_SECS`          | `60`                    |
    /// | `THROTTLE_ANONYMOUS_MAX`        | `100`                   |
    /// | `THROTTLE_AUTHENTICATED_MAX`    | `300`                   |
    /// | `REFRESH_COOKIE_SECURE`         | `true`                  |
    /// | `SESSION_CLEANUP_INTERVAL_SECS` | `3600`                  |
    /// | `ATTEMPT_RETENTION_DAYS`        | `30`                    |
    ///
    /// JWT settings are documented on [`JwtConfig::from_env`].
    ///
    /// # Panics
    ///
    /// Panics on malformed values, which is the desired behaviour: a
    /// misconfigured server should not start.
    pub fn from_env() -> Self {
        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let defaults = ThrottleConfig::default();
        let throttle = ThrottleConfig {
            window_secs: env_or("THROTTLE_WINDOW_SECS", defaults.window_secs),
            anonymous_max: env_or("THROTTLE_ANONYMOUS_MAX", defaults.anonymous_max),
            authenticated_max: env_or("THROTTLE_AUTHENTICATED_MAX", defaults.authenticated_max),
        };

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_or("PORT", 3000),
            cors_origins,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: env_or("SHUTDOWN_TIMEOUT_SECS", 30),
            app_env: env_or("APP_ENV", AppEnv::default()),
            trust_proxy_hops: env_or("TRUST_PROXY_HOPS", 0),
            redis_url: env_opt("REDIS_URL"),
            jwt: JwtConfig::from_env(),
            rate_limit: RateLimitConfig {
                fail_open: env_or("RATE_LIMIT_FAIL_OPEN", true),
                bypass_token: env_opt("RATE_LIMIT_BYPASS_TOKEN"),
                throttle,
                auth: AuthLimits::default(),
            },
            refresh_cookie_secure: env_or("REFRESH_COOKIE_SECURE", true),
            session_cleanup_interval_secs: env_or("SESSION_CLEANUP_INTERVAL_SECS", 3600),
            attempt_retention_days: env_or("ATTEMPT_RETENTION_DAYS", 30),
        }
    }
}
