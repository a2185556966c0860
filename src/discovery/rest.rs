//! REST polling discovery source. Grounded on `scrapers/dome_rest.rs`'s
//! poll-interval loop, adapted to push through the `DiscoverySource` trait.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, warn};

use super::DiscoverySource;
use crate::circuit_breaker::CircuitBreaker;
use crate::error::ProviderError;
use crate::model::{Fingerprint, PairCandidate, TxCountWindows, TxCounts, VolumeWindows};
use crate::rate_limiter::RateLimiter;

#[derive(Debug, Deserialize)]
struct NewPairItem {
    address: String,
    base_mint: String,
    quote_mint: String,
    created_at_unix: i64,
    #[serde(default)]
    price_usd: Option<f64>,
    #[serde(default)]
    liquidity_usd: Option<f64>,
    #[serde(default)]
    volume_24h_usd: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct NewPairsResponse {
    data: Vec<NewPairItem>,
}

/// Polls a "new listings" endpoint on a fixed cadence and pushes pairs not
/// already seen. `seen` is unbounded for the process lifetime; the
/// Scheduler's own TTL-based bookkeeping is what actually bounds memory for
/// long-running processes (spec §4.7's "discard stale candidates").
pub struct RestDiscoverySource {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    poll_interval: Duration,
    rate_limiter: Arc<RateLimiter>,
    circuit_breaker: Arc<CircuitBreaker>,
    seen: Mutex<HashSet<String>>,
}

impl RestDiscoverySource {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        poll_interval: Duration,
        rate_limiter: Arc<RateLimiter>,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
            poll_interval,
            rate_limiter,
            circuit_breaker,
            seen: Mutex::new(HashSet::new()),
        }
    }

    async fn fetch_new_pairs(&self) -> Result<Vec<PairCandidate>, ProviderError> {
        if crate::circuit_breaker::Admission::Denied == self.circuit_breaker.try_admit() {
            return Err(ProviderError::CircuitOpen {
                provider: "discovery_rest".into(),
            });
        }

        self.rate_limiter.acquire("discovery_rest").await;

        let url = format!("{}/defi/v2/tokens/new_listing", self.base_url);
        let mut req = self.client.get(&url);
        if let Some(key) = &self.api_key {
            req = req.header("X-API-KEY", key.clone());
        }

        let response = req.send().await.map_err(|e| {
            self.circuit_breaker.on_failure();
            ProviderError::Transient(e.to_string())
        })?;

        if !response.status().is_success() {
            self.circuit_breaker.on_failure();
            return Err(ProviderError::BadResponse(format!(
                "new_listing returned {}",
                response.status()
            )));
        }
        self.circuit_breaker.on_success();
        self.rate_limiter.on_success("discovery_rest").await;

        let body: NewPairsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::BadResponse(e.to_string()))?;

        let mut seen = self.seen.lock();
        let fresh: Vec<PairCandidate> = body
            .data
            .into_iter()
            .filter(|item| seen.insert(item.address.clone()))
            .map(|item| PairCandidate {
                pair_id: Fingerprint::new(item.address.clone()),
                base_token: Fingerprint::new(item.base_mint),
                quote_token: Fingerprint::new(item.quote_mint),
                created_at: chrono::Utc
                    .timestamp_opt(item.created_at_unix, 0)
                    .single()
                    .unwrap_or_else(chrono::Utc::now),
                price_usd: item.price_usd,
                liquidity_usd: item.liquidity_usd,
                volume_24h_usd: item.volume_24h_usd,
                market_cap_usd: None,
                price_change_1h_pct: None,
                price_change_6h_pct: None,
                price_change_24h_pct: None,
                tx_counts: TxCountWindows::default(),
                volume_windows: VolumeWindows::default(),
            })
            .collect();

        Ok(fresh)
    }
}

use chrono::TimeZone;

#[async_trait]
impl DiscoverySource for RestDiscoverySource {
    async fn run(&self, tx: mpsc::Sender<PairCandidate>) -> Result<(), ProviderError> {
        let mut ticker = interval(self.poll_interval);
        loop {
            ticker.tick().await;

            match self.fetch_new_pairs().await {
                Ok(pairs) => {
                    debug!(count = pairs.len(), "discovery rest poll");
                    for pair in pairs {
                        if tx.send(pair).await.is_err() {
                            return Ok(());
                        }
                    }
                }
                Err(ProviderError::CircuitOpen { .. }) => {
                    debug!("discovery rest circuit open, skipping tick");
                }
                Err(e) => {
                    warn!(error = %e, "discovery rest poll failed");
                }
            }
        }
    }
}
