//! Per-domain adaptive rate limiting (spec §4.2).
//!
//! Each domain (one per provider/endpoint class) gets its own interval that
//! backs off on rate-limit hits and gradually tightens back down on runs of
//! success. `acquire` serializes callers for a domain behind a per-domain
//! async mutex and sleeps out the remainder of the interval before
//! returning, mirroring the `asyncio.Lock`-per-domain shape of the reference
//! implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::RateLimitConfig;

/// Extra margin held past a provider's own `reset_at` to absorb clock skew
/// between our read of `reset_at` and the provider's actual reset instant.
const RESET_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
struct DomainState {
    config: RateLimitConfig,
    interval: Duration,
    consecutive_successes: u32,
    consecutive_failures: u32,
    last_request_at: Option<Instant>,
    total_requests: u64,
    rate_limit_hits: u64,
    blocked_until: Option<Instant>,
}

impl DomainState {
    fn new(config: RateLimitConfig) -> Self {
        let interval = Duration::from_millis(config.base_interval_ms);
        Self {
            config,
            interval,
            consecutive_successes: 0,
            consecutive_failures: 0,
            last_request_at: None,
            total_requests: 0,
            rate_limit_hits: 0,
            blocked_until: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DomainStats {
    pub current_interval: Duration,
    pub total_requests: u64,
    pub rate_limit_hits: u64,
    pub hit_rate_pct: f64,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

/// Adaptive per-domain rate limiter. Domains are created lazily on first use.
pub struct RateLimiter {
    default_config: RateLimitConfig,
    domain_configs: SyncMutex<HashMap<String, RateLimitConfig>>,
    domains: SyncMutex<HashMap<String, Arc<AsyncMutex<DomainState>>>>,
}

impl RateLimiter {
    pub fn new(default_config: RateLimitConfig) -> Self {
        Self {
            default_config,
            domain_configs: SyncMutex::new(HashMap::new()),
            domains: SyncMutex::new(HashMap::new()),
        }
    }

    /// Overrides the config used the next time `domain` is first seen.
    /// Has no effect on a domain whose state already exists.
    pub fn configure_domain(&self, domain: &str, config: RateLimitConfig) {
        self.domain_configs
            .lock()
            .insert(domain.to_string(), config);
    }

    fn domain_handle(&self, domain: &str) -> Arc<AsyncMutex<DomainState>> {
        let mut domains = self.domains.lock();
        domains
            .entry(domain.to_string())
            .or_insert_with(|| {
                let config = self
                    .domain_configs
                    .lock()
                    .get(domain)
                    .cloned()
                    .unwrap_or_else(|| self.default_config.clone());
                Arc::new(AsyncMutex::new(DomainState::new(config)))
            })
            .clone()
    }

    /// Blocks until `domain`'s pacing interval has elapsed since the last
    /// request on that domain and, if a prior rate-limit hit set a
    /// `blocked_until` floor, until that has passed too, then records the
    /// request as started.
    pub async fn acquire(&self, domain: &str) {
        let handle = self.domain_handle(domain);
        let mut state = handle.lock().await;

        let now = Instant::now();
        if let Some(last) = state.last_request_at {
            let elapsed = now.duration_since(last);
            if elapsed < state.interval {
                let wait = state.interval - elapsed;
                debug!(domain, wait_ms = wait.as_millis(), "rate limiter pacing");
                sleep(wait).await;
            }
        }

        if let Some(blocked_until) = state.blocked_until {
            let now = Instant::now();
            if blocked_until > now {
                let wait = blocked_until - now;
                debug!(domain, wait_ms = wait.as_millis(), "rate limiter waiting out reset_at gate");
                sleep(wait).await;
            }
            state.blocked_until = None;
        }

        state.last_request_at = Some(Instant::now());
        state.total_requests += 1;
    }

    /// Records a successful request and, after `optimization_threshold`
    /// consecutive successes, tightens the interval toward `min_interval_ms`.
    pub async fn on_success(&self, domain: &str) {
        let handle = self.domain_handle(domain);
        let mut state = handle.lock().await;

        state.consecutive_successes += 1;
        state.consecutive_failures = 0;

        if state.consecutive_successes >= state.config.optimization_threshold {
            let min_interval = Duration::from_millis(state.config.min_interval_ms);
            let reduced = state.interval.mul_f64(state.config.success_reduction);
            let new_interval = reduced.max(min_interval);
            if new_interval != state.interval {
                debug!(domain, ?new_interval, "rate limiter optimized interval down");
            }
            state.interval = new_interval;
            state.consecutive_successes = 0;
        }
    }

    /// Records a rate-limit hit (HTTP 429 or provider-signaled throttle),
    /// applies exponential backoff capped at `max_interval_ms`, and, if the
    /// provider gave a `reset_at`, sets a hard floor `reset_at + 1s` past
    /// which `acquire` must not let any caller through on this domain.
    pub async fn on_rate_limited(&self, domain: &str, reset_at: Option<SystemTime>) {
        let handle = self.domain_handle(domain);
        let mut state = handle.lock().await;

        state.consecutive_failures += 1;
        state.consecutive_successes = 0;
        state.rate_limit_hits += 1;

        let max_interval = Duration::from_millis(state.config.max_interval_ms);
        let backed_off = state.interval.mul_f64(state.config.backoff_multiplier);
        state.interval = backed_off.min(max_interval);

        if let Some(reset_at) = reset_at {
            let remaining = reset_at.duration_since(SystemTime::now()).unwrap_or(Duration::ZERO);
            let blocked_until = Instant::now() + remaining + RESET_GRACE;
            state.blocked_until = Some(match state.blocked_until {
                Some(existing) if existing > blocked_until => existing,
                _ => blocked_until,
            });
        }

        warn!(domain, new_interval = ?state.interval, "rate limit hit, backing off");
    }

    pub async fn stats(&self, domain: &str) -> DomainStats {
        let handle = self.domain_handle(domain);
        let state = handle.lock().await;
        let hit_rate_pct = if state.total_requests == 0 {
            0.0
        } else {
            state.rate_limit_hits as f64 / state.total_requests as f64 * 100.0
        };
        DomainStats {
            current_interval: state.interval,
            total_requests: state.total_requests,
            rate_limit_hits: state.rate_limit_hits,
            hit_rate_pct,
            consecutive_successes: state.consecutive_successes,
            consecutive_failures: state.consecutive_failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> RateLimitConfig {
        RateLimitConfig {
            base_interval_ms: 20,
            min_interval_ms: 5,
            max_interval_ms: 200,
            backoff_multiplier: 2.0,
            success_reduction: 0.5,
            optimization_threshold: 2,
        }
    }

    #[tokio::test]
    async fn acquire_paces_requests() {
        let limiter = RateLimiter::new(fast_config());
        let start = Instant::now();
        limiter.acquire("domain").await;
        limiter.acquire("domain").await;
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn success_reduces_interval_after_threshold() {
        let limiter = RateLimiter::new(fast_config());
        limiter.acquire("domain").await;
        limiter.on_success("domain").await;
        limiter.on_success("domain").await;

        let stats = limiter.stats("domain").await;
        assert_eq!(stats.current_interval, Duration::from_millis(10));
    }

    #[tokio::test]
    async fn rate_limit_hit_backs_off_and_caps_at_max() {
        let limiter = RateLimiter::new(fast_config());
        for _ in 0..10 {
            limiter.on_rate_limited("domain", None).await;
        }
        let stats = limiter.stats("domain").await;
        assert_eq!(stats.current_interval, Duration::from_millis(200));
        assert_eq!(stats.rate_limit_hits, 10);
    }

    #[tokio::test]
    async fn domains_are_independent() {
        let limiter = RateLimiter::new(fast_config());
        limiter.on_rate_limited("a", None).await;
        let stats_a = limiter.stats("a").await;
        let stats_b = limiter.stats("b").await;
        assert_eq!(stats_a.rate_limit_hits, 1);
        assert_eq!(stats_b.rate_limit_hits, 0);
    }

    #[tokio::test]
    async fn reset_at_blocks_acquire_until_grace_elapses() {
        let limiter = RateLimiter::new(fast_config());
        let reset_at = SystemTime::now() + Duration::from_millis(30);
        limiter.on_rate_limited("domain", Some(reset_at)).await;

        let start = Instant::now();
        limiter.acquire("domain").await;
        assert!(start.elapsed() >= Duration::from_millis(30) + RESET_GRACE);
    }
}
