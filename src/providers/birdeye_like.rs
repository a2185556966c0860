//! A Birdeye-style provider: pair overviews, security reports, and batch
//! multi-price lookups. Grounded on `scrapers/dome.rs` for the request
//! shape and `original_source/api/birdeye_cost_calculator.py`'s endpoint
//! catalog for the endpoint names this provider's cost meter would track.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::http::ProviderHttpClient;
use super::{Named, ProviderClient, SecurityReport};
use crate::circuit_breaker::CircuitBreaker;
use crate::cost_meter::{CostMeter, EndpointCost};
use crate::error::ProviderError;
use crate::model::{Fingerprint, PairCandidate, TxCountWindows, TxCounts, VolumeWindows};
use crate::rate_limiter::RateLimiter;

pub struct BirdeyeLikeProvider {
    http: ProviderHttpClient,
    base_url: String,
    api_key: String,
    cost_meter: Arc<CostMeter>,
}

impl BirdeyeLikeProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        rate_limiter: Arc<RateLimiter>,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            http: ProviderHttpClient::new("birdeye_like", rate_limiter, circuit_breaker),
            base_url: base_url.into(),
            api_key: api_key.into(),
            cost_meter: Arc::new(CostMeter::new(Self::endpoint_cost_catalog())),
        }
    }

    /// Session spend so far, for a caller (typically `main`) to log at
    /// shutdown or on an observability tick.
    pub fn cost_meter(&self) -> Arc<CostMeter> {
        self.cost_meter.clone()
    }

    /// The endpoint-cost catalog a `CostMeter` should be built from for this
    /// provider, per the reference calculator's documented batch formula.
    pub fn endpoint_cost_catalog() -> HashMap<String, EndpointCost> {
        let mut catalog = HashMap::new();
        catalog.insert("/defi/token_overview".to_string(), EndpointCost::PerItem(30));
        catalog.insert("/defi/token_security".to_string(), EndpointCost::PerItem(50));
        catalog.insert(
            "/defi/multi_price".to_string(),
            EndpointCost::Batch { base_cu: 5, n_max: 100 },
        );
        catalog.insert(
            "/defi/v3/token/meta-data/multiple".to_string(),
            EndpointCost::Batch { base_cu: 5, n_max: 50 },
        );
        catalog
    }
}

impl Named for BirdeyeLikeProvider {
    fn name(&self) -> &str {
        "birdeye_like"
    }
}

#[derive(Debug, Deserialize)]
struct OverviewData {
    address: String,
    price: Option<f64>,
    liquidity: Option<f64>,
    #[serde(rename = "v24hUSD")]
    volume_24h_usd: Option<f64>,
    #[serde(rename = "mc")]
    market_cap: Option<f64>,
    #[serde(rename = "priceChange1hPercent")]
    price_change_1h_pct: Option<f64>,
    #[serde(rename = "priceChange6hPercent")]
    price_change_6h_pct: Option<f64>,
    #[serde(rename = "priceChange24hPercent")]
    price_change_24h_pct: Option<f64>,
    #[serde(rename = "buy1h")]
    buy_1h: Option<u64>,
    #[serde(rename = "sell1h")]
    sell_1h: Option<u64>,
    #[serde(rename = "buy24h")]
    buy_24h: Option<u64>,
    #[serde(rename = "sell24h")]
    sell_24h: Option<u64>,
    #[serde(rename = "v1hUSD")]
    volume_1h_usd: Option<f64>,
    #[serde(rename = "v24hUSD_6h")]
    volume_6h_usd: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OverviewResponse {
    data: Option<OverviewData>,
}

#[derive(Debug, Deserialize)]
struct SecurityData {
    #[serde(rename = "isOpenSource")]
    is_open_source: Option<bool>,
    #[serde(rename = "freezeAuthority")]
    freeze_authority: Option<String>,
    #[serde(rename = "isHoneypot")]
    is_honeypot: Option<bool>,
    #[serde(rename = "buyTax")]
    buy_tax: Option<f64>,
    #[serde(rename = "sellTax")]
    sell_tax: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SecurityResponse {
    data: Option<SecurityData>,
}

#[async_trait]
impl ProviderClient for BirdeyeLikeProvider {
    async fn fetch_pair(&self, pair_id: &str) -> Result<PairCandidate, ProviderError> {
        let url = format!("{}/defi/token_overview", self.base_url);
        let client = self.http.client.clone();
        let api_key = self.api_key.clone();
        let pair_id = pair_id.to_string();

        let response = self
            .http
            .execute_with_retry(|| {
                client
                    .get(&url)
                    .header("X-API-KEY", api_key.clone())
                    .header("x-chain", "solana")
                    .query(&[("address", pair_id.clone())])
                    .send()
            })
            .await?;

        let body: OverviewResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::BadResponse(e.to_string()))?;

        let data = body
            .data
            .ok_or_else(|| ProviderError::BadResponse("empty token_overview data".into()))?;

        self.cost_meter.track_call("/defi/token_overview", 1, false);

        Ok(PairCandidate {
            pair_id: Fingerprint::new(data.address.clone()),
            base_token: Fingerprint::new(data.address),
            quote_token: Fingerprint::new("So11111111111111111111111111111111111111112"),
            created_at: chrono::Utc::now(),
            price_usd: data.price,
            liquidity_usd: data.liquidity,
            volume_24h_usd: data.volume_24h_usd,
            market_cap_usd: data.market_cap,
            price_change_1h_pct: data.price_change_1h_pct,
            price_change_6h_pct: data.price_change_6h_pct,
            price_change_24h_pct: data.price_change_24h_pct,
            tx_counts: TxCountWindows {
                h1: TxCounts {
                    buys: data.buy_1h.unwrap_or(0),
                    sells: data.sell_1h.unwrap_or(0),
                },
                h6: TxCounts::default(),
                h24: TxCounts {
                    buys: data.buy_24h.unwrap_or(0),
                    sells: data.sell_24h.unwrap_or(0),
                },
            },
            volume_windows: VolumeWindows {
                h1: data.volume_1h_usd.unwrap_or(0.0),
                h6: data.volume_6h_usd.unwrap_or(0.0),
                h24: data.volume_24h_usd.unwrap_or(0.0),
            },
        })
    }

    async fn fetch_security_report(
        &self,
        address: &Fingerprint,
    ) -> Result<SecurityReport, ProviderError> {
        let url = format!("{}/defi/token_security", self.base_url);
        let client = self.http.client.clone();
        let api_key = self.api_key.clone();
        let address_str = address.as_str().to_string();

        let response = self
            .http
            .execute_with_retry(|| {
                client
                    .get(&url)
                    .header("X-API-KEY", api_key.clone())
                    .header("x-chain", "solana")
                    .query(&[("address", address_str.clone())])
                    .send()
            })
            .await?;

        let body: SecurityResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::BadResponse(e.to_string()))?;

        let data = body
            .data
            .ok_or_else(|| ProviderError::BadResponse("empty token_security data".into()))?;

        self.cost_meter.track_call("/defi/token_security", 1, false);

        Ok(SecurityReport {
            contract_verified: data.is_open_source.unwrap_or(false),
            mint_frozen: data.freeze_authority.is_some(),
            is_honeypot: data.is_honeypot.unwrap_or(false),
            buy_tax_pct: data.buy_tax.unwrap_or(0.0),
            sell_tax_pct: data.sell_tax.unwrap_or(0.0),
        })
    }
}
