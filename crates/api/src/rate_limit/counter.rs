//! Fixed-window counter limiter for the global API throttle.
//!
//! Each key gets one counter per window, named `rl:{key}:{floor(now_ms /
//! window_ms)}`, so a new window always starts from zero without any reset
//! bookkeeping. Counters live in Redis when `REDIS_URL` is configured and in
//! an in-process [`DashMap`] otherwise.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use redis::aio::ConnectionManager;

use super::{seconds_until, RateDecision, RateRule};

/// Error type for counter store failures.
#[derive(Debug, thiserror::Error)]
pub enum CounterError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Counter store unavailable: {0}")]
    Unavailable(String),
}

/// Volatile store of expiring counters.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key` and return the new value. The counter expires `ttl`
    /// after it was created.
    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, CounterError>;

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}

/// Entries beyond this count trigger a sweep of expired counters.
const SWEEP_THRESHOLD: usize = 10_000;

struct Counter {
    count: u64,
    expires_at: Instant,
}

/// In-process counters for single-node deployments and tests.
#[derive(Default)]
pub struct MemoryCounterStore {
    counters: DashMap<String, Counter>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired counters. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.counters.len();
        self.counters.retain(|_, c| c.expires_at > now);
        before - self.counters.len()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, CounterError> {
        let now = Instant::now();
        let count = {
            let mut entry = self.counters.entry(key.to_string()).or_insert(Counter {
                count: 0,
                expires_at: now + ttl,
            });
            if entry.expires_at <= now {
                entry.count = 0;
                entry.expires_at = now + ttl;
            }
            entry.count += 1;
            entry.count
        };

        if self.counters.len() > SWEEP_THRESHOLD {
            self.sweep();
        }
        Ok(count)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Counters in Redis, shared by every API node.
#[derive(Clone)]
pub struct RedisCounterStore {
    conn: ConnectionManager,
}

impl RedisCounterStore {
    /// Connect to `url`. The connection manager reconnects on its own after
    /// transient failures.
    pub async fn connect(url: &str) -> Result<Self, CounterError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, CounterError> {
        let mut conn = self.conn.clone();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .pexpire(key, ttl_ms)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

/// Fixed-window limiter over a [`CounterStore`].
pub struct CounterLimiter {
    store: Arc<dyn CounterStore>,
    /// Whether a store failure lets the request through.
    fail_open: bool,
}

impl CounterLimiter {
    pub fn new(store: Arc<dyn CounterStore>, fail_open: bool) -> Self {
        Self { store, fail_open }
    }

    pub async fn check(&self, key: &str, rule: &RateRule) -> RateDecision {
        self.check_at(key, rule, Utc::now().timestamp_millis()).await
    }

    /// Count one request for `key` in the window containing `now_ms`.
    pub async fn check_at(&self, key: &str, rule: &RateRule, now_ms: i64) -> RateDecision {
        let window_ms = rule.window_ms().max(1);
        let bucket = now_ms.div_euclid(window_ms);
        let reset_ms = (bucket + 1) * window_ms;
        let counter_key = format!("rl:{key}:{bucket}");
        let ttl = Duration::from_millis(window_ms as u64);

        let count = match self.store.incr(&counter_key, ttl).await {
            Ok(count) => count,
            Err(err) if self.fail_open => {
                tracing::warn!(
                    key,
                    backend = self.store.backend(),
                    error = %err,
                    "Counter store unavailable, failing open"
                );
                return RateDecision::unlimited(rule);
            }
            Err(err) => {
                tracing::error!(
                    key,
                    backend = self.store.backend(),
                    error = %err,
                    "Counter store unavailable, failing closed"
                );
                u64::MAX
            }
        };

        let allowed = count <= u64::from(rule.max);
        RateDecision {
            allowed,
            limit: rule.max,
            remaining: u32::try_from(u64::from(rule.max).saturating_sub(count)).unwrap_or(0),
            reset_at: reset_ms.div_euclid(1000),
            retry_after: if allowed { 0 } else { seconds_until(now_ms, reset_ms) },
        }
    }
}
