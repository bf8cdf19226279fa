use std::sync::Arc;

use crowdship_db::Stores;
use crowdship_events::Notifier;

use crate::auth::tokens::TokenService;
use crate::config::ServerConfig;
use crate::rate_limit::counter::{CounterLimiter, CounterStore};
use crate::rate_limit::durable::AttemptLimiter;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
/// Every backend is injected here by the process entry point or a test.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub stores: Stores,
    pub tokens: Arc<TokenService>,
    /// Auth-endpoint limits over the attempt log.
    pub attempts: AttemptLimiter,
    /// Global per-caller throttle.
    pub throttle: Arc<CounterLimiter>,
    /// Out-of-band delivery of reset tokens and one-time codes.
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        stores: Stores,
        counters: Arc<dyn CounterStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let fail_open = config.rate_limit.fail_open;
        let tokens = TokenService::new(
            config.jwt.clone(),
            stores.users.clone(),
            stores.sessions.clone(),
        );

        Self {
            attempts: AttemptLimiter::new(stores.attempts.clone(), fail_open),
            throttle: Arc::new(CounterLimiter::new(counters, fail_open)),
            tokens: Arc::new(tokens),
            config: Arc::new(config),
            stores,
            notifier,
        }
    }
}
