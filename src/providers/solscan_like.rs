//! A Solscan-style provider: pair/token metadata and holder lists.
//! Grounded on `scrapers/dome.rs`'s struct-per-provider shape, with typed
//! response structs parsed at the boundary rather than passed through as
//! raw JSON.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;

use super::http::ProviderHttpClient;
use super::{Named, ProviderClient, TokenMetadata};
use crate::circuit_breaker::CircuitBreaker;
use crate::error::ProviderError;
use crate::model::{Fingerprint, HolderEntry};
use crate::rate_limiter::RateLimiter;

pub struct SolscanLikeProvider {
    http: ProviderHttpClient,
    base_url: String,
    api_key: Option<String>,
}

impl SolscanLikeProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        rate_limiter: Arc<RateLimiter>,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            http: ProviderHttpClient::new("solscan_like", rate_limiter, circuit_breaker),
            base_url: base_url.into(),
            api_key,
        }
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("token", key.clone()),
            None => builder,
        }
    }
}

impl Named for SolscanLikeProvider {
    fn name(&self) -> &str {
        "solscan_like"
    }
}

#[derive(Debug, Deserialize)]
struct MetaResponse {
    name: Option<String>,
    symbol: Option<String>,
    holder: Option<u64>,
    #[serde(rename = "createdTime")]
    created_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct HolderItem {
    address: String,
    amount: f64,
}

#[derive(Debug, Deserialize)]
struct HoldersResponse {
    data: Vec<HolderItem>,
}

#[async_trait]
impl ProviderClient for SolscanLikeProvider {
    async fn fetch_token_metadata(
        &self,
        address: &Fingerprint,
    ) -> Result<TokenMetadata, ProviderError> {
        let url = format!("{}/token/meta", self.base_url);
        let client = self.http.client.clone();
        let address_str = address.as_str().to_string();

        let response = self
            .http
            .execute_with_retry(|| {
                let req = client
                    .get(&url)
                    .query(&[("address", address_str.clone())]);
                self.authed(req).send()
            })
            .await?;

        let body: MetaResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::BadResponse(e.to_string()))?;

        Ok(TokenMetadata {
            name: body.name,
            symbol: body.symbol,
            holder_count: body.holder,
            creation_time: body
                .created_time
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        })
    }

    async fn fetch_holders(
        &self,
        address: &Fingerprint,
        limit: usize,
    ) -> Result<Vec<HolderEntry>, ProviderError> {
        let url = format!("{}/token/holders", self.base_url);
        let client = self.http.client.clone();
        let address_str = address.as_str().to_string();
        let limit_str = limit.to_string();

        let response = self
            .http
            .execute_with_retry(|| {
                let req = client.get(&url).query(&[
                    ("address", address_str.clone()),
                    ("limit", limit_str.clone()),
                ]);
                self.authed(req).send()
            })
            .await?;

        let body: HoldersResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::BadResponse(e.to_string()))?;

        Ok(body
            .data
            .into_iter()
            .map(|item| HolderEntry {
                address: Fingerprint::new(item.address),
                amount: item.amount,
            })
            .collect())
    }
}
