//! Provider client trait and concrete implementations (spec §4.5).
//!
//! `ProviderClient` is a capability-subset interface: not every provider
//! backs every method, the same way the teacher's scraper modules each
//! expose a different slice of market data. Discovery and Enrichment call
//! through the trait object so a provider outage degrades gracefully
//! instead of taking the pipeline down.

mod birdeye_like;
mod http;
mod solscan_like;

pub use birdeye_like::BirdeyeLikeProvider;
pub use http::ProviderHttpClient;
pub use solscan_like::SolscanLikeProvider;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::model::{Fingerprint, HolderEntry, PairCandidate};

/// A single provider's self-reported name, used as the rate limiter /
/// circuit breaker / cost meter domain key.
pub trait Named {
    fn name(&self) -> &str;
}

/// Capability-subset interface a provider may implement any slice of.
/// Methods return `ProviderError::BadResponse` rather than panicking on a
/// malformed payload, and `ProviderError::Transient`/`RateLimited` for
/// retryable failures — see spec §4.5's error taxonomy.
#[async_trait]
pub trait ProviderClient: Named + Send + Sync {
    async fn fetch_pair(&self, _pair_id: &str) -> Result<PairCandidate, ProviderError> {
        Err(ProviderError::BadResponse("not supported by this provider".into()))
    }

    async fn fetch_pairs(&self, _pair_ids: &[String]) -> Result<Vec<PairCandidate>, ProviderError> {
        Err(ProviderError::BadResponse("not supported by this provider".into()))
    }

    async fn fetch_token_metadata(
        &self,
        _address: &Fingerprint,
    ) -> Result<TokenMetadata, ProviderError> {
        Err(ProviderError::BadResponse("not supported by this provider".into()))
    }

    async fn fetch_holders(
        &self,
        _address: &Fingerprint,
        _limit: usize,
    ) -> Result<Vec<HolderEntry>, ProviderError> {
        Err(ProviderError::BadResponse("not supported by this provider".into()))
    }

    async fn fetch_security_report(
        &self,
        _address: &Fingerprint,
    ) -> Result<SecurityReport, ProviderError> {
        Err(ProviderError::BadResponse("not supported by this provider".into()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct TokenMetadata {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub holder_count: Option<u64>,
    pub creation_time: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct SecurityReport {
    pub contract_verified: bool,
    pub mint_frozen: bool,
    pub is_honeypot: bool,
    pub buy_tax_pct: f64,
    pub sell_tax_pct: f64,
}
