//! Per-user rate limiting for expensive operations.
//!
//! Generation and render submissions fan out to external services, so each
//! user gets an independent budget per operation kind. Limiters are cached
//! per `(user, operation)` and expire so the cache stays bounded.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio::sync::RwLock;
use tracing::warn;

use adreel_models::IdempotencyOperation;

/// Per-key limiter type alias.
pub type UserRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Maximum number of `(user, operation)` pairs to track.
/// Prevents unbounded memory growth from churning users.
const MAX_RATE_LIMITER_ENTRIES: usize = 10_000;

/// Gate consulted before every expensive operation.
///
/// `Err` carries how long the caller should wait before retrying.
#[async_trait]
pub trait RateGate: Send + Sync {
    async fn allow(&self, user_id: &str, operation: IdempotencyOperation)
        -> Result<(), Duration>;
}

/// Gate that admits everything; used in tests.
#[derive(Debug, Default, Clone)]
pub struct NoopGate;

#[async_trait]
impl RateGate for NoopGate {
    async fn allow(
        &self,
        _user_id: &str,
        _operation: IdempotencyOperation,
    ) -> Result<(), Duration> {
        Ok(())
    }
}

/// Per-minute budgets, one per guarded operation.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub generate_per_minute: u32,
    pub regenerate_scene_per_minute: u32,
    pub generate_assets_per_minute: u32,
    pub render_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            generate_per_minute: 5,
            regenerate_scene_per_minute: 10,
            generate_assets_per_minute: 10,
            render_per_minute: 3,
        }
    }
}

impl RateLimitConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        fn parse_var(name: &str, default: u32) -> u32 {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default)
        }

        Self {
            generate_per_minute: parse_var("RATE_LIMIT_GENERATE_PER_MIN", defaults.generate_per_minute),
            regenerate_scene_per_minute: parse_var(
                "RATE_LIMIT_REGENERATE_PER_MIN",
                defaults.regenerate_scene_per_minute,
            ),
            generate_assets_per_minute: parse_var(
                "RATE_LIMIT_ASSETS_PER_MIN",
                defaults.generate_assets_per_minute,
            ),
            render_per_minute: parse_var("RATE_LIMIT_RENDER_PER_MIN", defaults.render_per_minute),
        }
    }

    fn quota_for(&self, operation: IdempotencyOperation) -> Quota {
        let per_minute = match operation {
            IdempotencyOperation::Generate => self.generate_per_minute,
            IdempotencyOperation::RegenerateScene => self.regenerate_scene_per_minute,
            IdempotencyOperation::GenerateAssets => self.generate_assets_per_minute,
            IdempotencyOperation::Render => self.render_per_minute,
        };
        Quota::per_minute(NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::new(1).unwrap()))
    }
}

/// `(user, operation)` keyed rate limiter cache with TTL cleanup.
#[derive(Clone)]
pub struct SlidingWindowLimiter {
    limiters: Arc<RwLock<HashMap<(String, IdempotencyOperation), (Arc<UserRateLimiter>, Instant)>>>,
    config: RateLimitConfig,
    /// Time-to-live for cached limiters
    ttl: Duration,
}

impl SlidingWindowLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            limiters: Arc::new(RwLock::new(HashMap::new())),
            config,
            ttl: Duration::from_secs(3600),
        }
    }

    /// Clean up expired limiters to prevent memory leaks.
    async fn cleanup_expired(&self) {
        let mut limiters = self.limiters.write().await;
        let now = Instant::now();

        limiters.retain(|_, (_, created_at)| now.duration_since(*created_at) < self.ttl);

        // If still over capacity, remove oldest entries
        if limiters.len() > MAX_RATE_LIMITER_ENTRIES {
            let mut entries: Vec<_> = limiters
                .iter()
                .map(|(key, (_, t))| (key.clone(), *t))
                .collect();
            entries.sort_by_key(|(_, t)| *t);

            let to_remove = limiters.len() - MAX_RATE_LIMITER_ENTRIES;
            for (key, _) in entries.into_iter().take(to_remove) {
                limiters.remove(&key);
            }
            warn!(
                "Rate limiter cache exceeded capacity, removed {} entries",
                to_remove
            );
        }
    }

    async fn get_limiter(
        &self,
        user_id: &str,
        operation: IdempotencyOperation,
    ) -> Arc<UserRateLimiter> {
        let key = (user_id.to_string(), operation);

        {
            let limiters = self.limiters.read().await;
            if let Some((limiter, _)) = limiters.get(&key) {
                return Arc::clone(limiter);
            }
        }

        let mut limiters = self.limiters.write().await;
        // Double-check after acquiring write lock
        if let Some((limiter, _)) = limiters.get(&key) {
            return Arc::clone(limiter);
        }

        if limiters.len() >= MAX_RATE_LIMITER_ENTRIES {
            drop(limiters);
            self.cleanup_expired().await;
            limiters = self.limiters.write().await;
        }

        let limiter = Arc::new(RateLimiter::direct(self.config.quota_for(operation)));
        limiters.insert(key, (Arc::clone(&limiter), Instant::now()));
        limiter
    }
}

#[async_trait]
impl RateGate for SlidingWindowLimiter {
    async fn allow(
        &self,
        user_id: &str,
        operation: IdempotencyOperation,
    ) -> Result<(), Duration> {
        let limiter = self.get_limiter(user_id, operation).await;
        match limiter.check() {
            Ok(_) => Ok(()),
            Err(not_until) => {
                let clock = DefaultClock::default();
                Err(not_until.wait_time_from(clock.now()))
            }
        }
    }
}
