//! Gem-finder backend library.
//!
//! Exposes the full pipeline (discovery -> filter -> enrichment -> scoring
//! -> alerting) as a library so `main.rs` and integration tests can both
//! wire it up against either live providers or in-memory fakes.

pub mod alert;
pub mod batch;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod cost_meter;
pub mod discovery;
pub mod enrichment;
pub mod error;
pub mod filter;
pub mod journal;
pub mod model;
pub mod providers;
pub mod rate_limiter;
pub mod scheduler;
pub mod scorer;
pub mod trend;
pub mod whale;
