//! Shared HTTP plumbing for provider clients: timeout-configured
//! `reqwest::Client`, retry-with-backoff, rate limiter/circuit breaker
//! integration. Grounded on `DomeScraper::new`/`execute_with_retry`.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use reqwest::{Response, StatusCode};
use tokio::time::{sleep, timeout};
use tracing::{error, warn};

use crate::circuit_breaker::{Admission, CircuitBreaker};
use crate::error::ProviderError;
use crate::rate_limiter::RateLimiter;

const MAX_RETRIES: u32 = 5;
const INITIAL_BACKOFF_MS: u64 = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Wraps a plain `reqwest::Client` with the rate limiter and circuit
/// breaker every concrete provider shares, keyed by `domain`.
pub struct ProviderHttpClient {
    pub(super) client: reqwest::Client,
    domain: String,
    rate_limiter: Arc<RateLimiter>,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl ProviderHttpClient {
    pub fn new(
        domain: impl Into<String>,
        rate_limiter: Arc<RateLimiter>,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            domain: domain.into(),
            rate_limiter,
            circuit_breaker,
        }
    }

    /// Runs `request_fn` with rate-limit pacing, a circuit breaker guard,
    /// and retry-with-backoff on transient transport failures and timeouts.
    /// HTTP 429 is not retried here: it records the hit against the rate
    /// limiter and fails the call immediately with `RateLimited`, leaving
    /// the retry decision to the caller.
    pub async fn execute_with_retry<F, Fut>(&self, request_fn: F) -> Result<Response, ProviderError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = reqwest::Result<Response>>,
    {
        if self.circuit_breaker.try_admit() == Admission::Denied {
            return Err(ProviderError::CircuitOpen {
                provider: self.domain.clone(),
            });
        }

        let mut backoff = Duration::from_millis(INITIAL_BACKOFF_MS);

        for attempt in 0..MAX_RETRIES {
            self.rate_limiter.acquire(&self.domain).await;

            match timeout(REQUEST_TIMEOUT, request_fn()).await {
                Ok(Ok(response)) => {
                    if response.status() == StatusCode::TOO_MANY_REQUESTS {
                        let reset_at = retry_after(&response);
                        self.rate_limiter.on_rate_limited(&self.domain, reset_at).await;
                        warn!(domain = %self.domain, ?reset_at, "rate limited");
                        return Err(ProviderError::RateLimited { reset_at });
                    }

                    if response.status().is_success() {
                        self.rate_limiter.on_success(&self.domain).await;
                        self.circuit_breaker.on_success();
                        return Ok(response);
                    }

                    let status = response.status();
                    error!(domain = %self.domain, %status, "provider returned error status");
                    self.circuit_breaker.on_failure();
                    return Err(ProviderError::BadResponse(format!(
                        "{} returned {status}",
                        self.domain
                    )));
                }
                Ok(Err(e)) => {
                    warn!(domain = %self.domain, attempt, error = %e, "request failed");
                    sleep(backoff).await;
                    backoff *= 2;
                }
                Err(_) => {
                    warn!(domain = %self.domain, attempt, "request timed out");
                    sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }

        self.circuit_breaker.on_failure();
        Err(ProviderError::Timeout(REQUEST_TIMEOUT))
    }
}

/// Parses a numeric `Retry-After` header (seconds) into an absolute instant.
/// Providers that send an HTTP-date or omit the header entirely leave the
/// rate limiter to fall back on its own backoff alone.
fn retry_after(response: &Response) -> Option<SystemTime> {
    let seconds: u64 = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()?;
    Some(SystemTime::now() + Duration::from_secs(seconds))
}
