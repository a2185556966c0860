//! Error taxonomy (spec §7).
//!
//! `ProviderError` is the typed boundary every provider call returns through;
//! pipeline stages degrade on it rather than propagating it raw. `GemFinderError`
//! covers the handful of conditions that are fatal to the whole process.

use std::time::SystemTime;
use thiserror::Error;

/// Errors a provider call can surface. None of these panic; callers pattern-match
/// and decide whether to degrade, retry (at a higher layer), or fail the token.
#[derive(Debug, Error, Clone)]
pub enum ProviderError {
    #[error("address failed format validation: {0}")]
    BadAddress(String),

    #[error("malformed response from provider: {0}")]
    BadResponse(String),

    #[error("transient transport failure: {0}")]
    Transient(String),

    #[error("rate limited, reset at {reset_at:?}")]
    RateLimited { reset_at: Option<SystemTime> },

    #[error("circuit open for provider {provider}")]
    CircuitOpen { provider: String },

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl ProviderError {
    /// Whether this failure should count against the circuit breaker.
    /// Bad input and rate-limit signals are excluded per spec §7 — a caller
    /// supplying a malformed address doesn't mean the provider is unhealthy,
    /// and a 429 is the rate limiter's concern, not the breaker's.
    pub fn counts_as_circuit_failure(&self) -> bool {
        !matches!(self, ProviderError::BadAddress(_) | ProviderError::RateLimited { .. })
    }
}

/// Process-level errors. Only `Configuration` and `Fatal` are fatal-to-the-process
/// (spec §7); everything else degrades at the stage that produced it.
#[derive(Debug, Error)]
pub enum GemFinderError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unrecoverable failure: {0}")]
    Fatal(String),
}
