//! Per-provider circuit breaker (spec §4.4).
//!
//! Closed/open/half-open state machine generalized from the teacher's
//! endpoint-rotator circuit breaker: instead of rotating to a sibling
//! endpoint on trip, a single provider's circuit simply stops admitting
//! calls until its cooldown elapses, then allows one probing call through.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    consecutive_failures: u32,
    open_until: Option<Instant>,
    half_open_probe_in_flight: bool,
    trips: u64,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            consecutive_failures: 0,
            open_until: None,
            half_open_probe_in_flight: false,
            trips: 0,
        }
    }
}

pub struct CircuitBreaker {
    provider: String,
    failure_threshold: u32,
    cooldown: Duration,
    state: Mutex<Inner>,
}

/// Whether a call is currently admitted through the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// Denied outright; the circuit is open and cooldown has not elapsed.
    Denied,
}

impl CircuitBreaker {
    pub fn new(provider: impl Into<String>, failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            provider: provider.into(),
            failure_threshold,
            cooldown,
            state: Mutex::new(Inner::default()),
        }
    }

    pub fn state(&self) -> CircuitState {
        let mut inner = self.state.lock();
        self.transition_if_cooldown_elapsed(&mut inner)
    }

    /// Returns whether a call should be allowed right now. In the
    /// half-open state only one caller is admitted as a probe; subsequent
    /// concurrent callers are denied until that probe resolves.
    pub fn try_admit(&self) -> Admission {
        let mut inner = self.state.lock();
        match self.transition_if_cooldown_elapsed(&mut inner) {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::Open => Admission::Denied,
            CircuitState::HalfOpen => {
                if inner.half_open_probe_in_flight {
                    Admission::Denied
                } else {
                    inner.half_open_probe_in_flight = true;
                    Admission::Allowed
                }
            }
        }
    }

    fn transition_if_cooldown_elapsed(&self, inner: &mut Inner) -> CircuitState {
        match inner.open_until {
            Some(until) if Instant::now() >= until => {
                inner.open_until = None;
                inner.half_open_probe_in_flight = false;
                CircuitState::HalfOpen
            }
            Some(_) => CircuitState::Open,
            None if inner.half_open_probe_in_flight => CircuitState::HalfOpen,
            None => CircuitState::Closed,
        }
    }

    /// Records a successful call. Closes the circuit and resets the
    /// failure count.
    pub fn on_success(&self) {
        let mut inner = self.state.lock();
        inner.consecutive_failures = 0;
        inner.open_until = None;
        inner.half_open_probe_in_flight = false;
    }

    /// Records a failed call that counts toward tripping the breaker. Not
    /// every `ProviderError` counts — callers should check
    /// `ProviderError::counts_as_circuit_failure` first.
    pub fn on_failure(&self) {
        let mut inner = self.state.lock();
        inner.half_open_probe_in_flight = false;
        inner.consecutive_failures += 1;

        if inner.consecutive_failures >= self.failure_threshold && inner.open_until.is_none() {
            inner.open_until = Some(Instant::now() + self.cooldown);
            inner.trips += 1;
            warn!(
                provider = %self.provider,
                cooldown_s = self.cooldown.as_secs(),
                trips = inner.trips,
                "circuit breaker tripped"
            );
        }
    }

    pub fn trip_count(&self) -> u64 {
        self.state.lock().trips
    }

    /// Forces the circuit closed, e.g. on operator intervention.
    pub fn reset(&self) {
        info!(provider = %self.provider, "circuit breaker reset");
        *self.state.lock() = Inner::default();
    }
}
