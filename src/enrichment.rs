//! Enrichment Stage (spec §4.8): fans out to provider clients in parallel
//! and assembles a `TokenRecord` from whatever arms come back. Grounded on
//! `original_source/services/token_enrichment_service.py::analyze_token_comprehensively`'s
//! fan-out-then-assemble shape and its partial-failure-safe-default policy;
//! the single `tokio::join!` over five independent calls mirrors
//! `signals/enrichment.rs::process_job`'s one-call-per-concern structure.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::cache::Cache;
use crate::config::Config;
use crate::model::{Fingerprint, PairCandidate, TokenRecord, TrendClass};
use crate::providers::{Named, ProviderClient, SecurityReport};
use crate::trend::{TrendAnalyzer, TrendSample};

#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    pub top_holders_limit: usize,
    pub whale_threshold: f64,
    pub price_discrepancy_threshold_pct: f64,
    pub cache_ttl: Duration,
}

impl EnrichmentConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_holders_limit: config.top_holders_limit,
            whale_threshold: config.whale_threshold,
            price_discrepancy_threshold_pct: config.price_discrepancy_threshold_pct,
            cache_ttl: Duration::from_secs(60),
        }
    }
}

/// Fans a `PairCandidate` out to a primary provider (overview, holders,
/// metadata, security) and a secondary provider (cross-price only), then
/// assembles the result into a `TokenRecord`. Each arm fails independently;
/// a failure marks its field `stale` and falls back to a safe default
/// rather than dropping the whole record (spec §4.8).
pub struct EnrichmentStage {
    primary: Arc<dyn ProviderClient>,
    secondary_price: Arc<dyn ProviderClient>,
    trend_analyzer: TrendAnalyzer,
    config: EnrichmentConfig,
    cache: Cache<Fingerprint, TokenRecord>,
}

impl EnrichmentStage {
    pub fn new(
        primary: Arc<dyn ProviderClient>,
        secondary_price: Arc<dyn ProviderClient>,
        config: EnrichmentConfig,
    ) -> Self {
        let cache = Cache::new(config.cache_ttl);
        Self {
            primary,
            secondary_price,
            trend_analyzer: TrendAnalyzer::new(),
            config,
            cache,
        }
    }

    /// Cached entry point the Scheduler Loop calls per surviving pair (spec
    /// §4.12 step 3, dataflow's "(cached) Enrichment"): concurrent lookups
    /// for the same address collapse into a single fan-out.
    pub async fn enrich_cached(&self, pair: &PairCandidate) -> Option<TokenRecord> {
        let key = pair.base_token.clone();
        let pair = pair.clone();
        self.cache
            .get_or_compute(key, || async move { self.enrich(&pair).await })
            .await
            .ok()
    }

    /// Runs the fan-out uncached. Returns `Err(())` only when the minimum
    /// viable record cannot be established (spec §4.8's identity-field
    /// floor) — every other partial failure is absorbed into
    /// `stale_fields`/`risk_factors` on the returned record.
    pub async fn enrich(&self, pair: &PairCandidate) -> Result<TokenRecord, ()> {
        let address = pair.base_token.clone();

        let (overview_result, holders_result, metadata_result, security_result, secondary_result) = tokio::join!(
            self.primary.fetch_pair(address.as_str()),
            self.primary
                .fetch_holders(&address, self.config.top_holders_limit),
            self.primary.fetch_token_metadata(&address),
            self.primary.fetch_security_report(&address),
            self.secondary_price.fetch_pair(address.as_str()),
        );

        let mut stale_fields = HashSet::new();
        let mut sources_used = HashSet::new();
        let mut risk_factors = HashSet::new();

        let overview = match overview_result {
            Ok(overview) => {
                sources_used.insert(self.primary.name().to_string());
                Some(overview)
            }
            Err(e) => {
                warn!(address = %address, error = %e, "overview fetch failed, falling back to discovery snapshot");
                None
            }
        };

        let price = overview.as_ref().and_then(|o| o.price_usd).or(pair.price_usd);
        if price.is_none() {
            stale_fields.insert("price".to_string());
        }

        let liquidity = overview
            .as_ref()
            .and_then(|o| o.liquidity_usd)
            .or(pair.liquidity_usd);
        if liquidity.is_none() {
            stale_fields.insert("liquidity".to_string());
        }

        let market_cap = overview
            .as_ref()
            .and_then(|o| o.market_cap_usd)
            .or(pair.market_cap_usd);
        if market_cap.is_none() {
            stale_fields.insert("market_cap".to_string());
        }

        let volume_24h = overview
            .as_ref()
            .and_then(|o| o.volume_24h_usd)
            .or(pair.volume_24h_usd);
        if volume_24h.is_none() {
            stale_fields.insert("volume_24h".to_string());
        }

        match &secondary_result {
            Ok(secondary) => {
                sources_used.insert(self.secondary_price.name().to_string());
                if let (Some(primary_price), Some(secondary_price)) = (price, secondary.price_usd) {
                    if primary_price > 0.0 {
                        let discrepancy_pct =
                            ((primary_price - secondary_price).abs() / primary_price) * 100.0;
                        if discrepancy_pct > self.config.price_discrepancy_threshold_pct {
                            risk_factors.insert("price_discrepancy".to_string());
                        }
                    }
                }
            }
            Err(e) => {
                warn!(address = %address, error = %e, "secondary price fetch failed, skipping discrepancy check");
            }
        }

        let metadata = match metadata_result {
            Ok(metadata) => {
                sources_used.insert(self.primary.name().to_string());
                Some(metadata)
            }
            Err(e) => {
                warn!(address = %address, error = %e, "metadata fetch failed");
                None
            }
        };

        let name = metadata.as_ref().and_then(|m| m.name.clone()).unwrap_or_default();
        if name.is_empty() {
            stale_fields.insert("name".to_string());
        }

        let symbol = metadata.as_ref().and_then(|m| m.symbol.clone()).unwrap_or_default();
        if symbol.is_empty() {
            stale_fields.insert("symbol".to_string());
        }

        let holders_list = match holders_result {
            Ok(list) => {
                sources_used.insert(self.primary.name().to_string());
                list
            }
            Err(e) => {
                warn!(address = %address, error = %e, "holders fetch failed");
                stale_fields.insert("top_holders".to_string());
                Vec::new()
            }
        };

        let holder_count = metadata
            .as_ref()
            .and_then(|m| m.holder_count)
            .or_else(|| (!holders_list.is_empty()).then(|| holders_list.len() as u64));
        if holder_count.is_none() {
            stale_fields.insert("holder_count".to_string());
        }

        let total_held: f64 = holders_list.iter().map(|h| h.amount).sum();
        let mut whale_holdings = HashMap::new();
        if total_held > 0.0 {
            for holder in &holders_list {
                let fraction = holder.amount / total_held;
                if fraction >= self.config.whale_threshold {
                    whale_holdings.insert(holder.address.clone(), fraction);
                }
            }
        }

        let mut top_holders = holders_list;
        top_holders.truncate(self.config.top_holders_limit);

        let security = match security_result {
            Ok(report) => {
                sources_used.insert(self.primary.name().to_string());
                report
            }
            Err(e) => {
                warn!(address = %address, error = %e, "security report fetch failed, assuming unverified");
                stale_fields.insert("security".to_string());
                SecurityReport::default()
            }
        };

        let volume_windows = overview.as_ref().map(|o| o.volume_windows).unwrap_or(pair.volume_windows);
        let tx_windows = overview.as_ref().map(|o| o.tx_counts).unwrap_or(pair.tx_counts);

        let volume_trend = self.trend_analyzer.analyze(TrendSample {
            h1: volume_windows.h1,
            h6: volume_windows.h6,
            h24: volume_windows.h24,
        });
        let tx_trend = self.trend_analyzer.analyze(TrendSample {
            h1: tx_windows.h1.total() as f64,
            h6: tx_windows.h6.total() as f64,
            h24: tx_windows.h24.total() as f64,
        });

        if matches!(volume_trend.class, TrendClass::StronglyIncreasing | TrendClass::Increasing)
            && matches!(tx_trend.class, TrendClass::StronglyIncreasing | TrendClass::Increasing)
        {
            risk_factors.insert(format!(
                "positive_trend_signal (vol={:?}, tx={:?}, accel={:.1}%)",
                volume_trend.class, tx_trend.class, volume_trend.acceleration_pct
            ));
        }

        let creation_time = metadata
            .as_ref()
            .and_then(|m| m.creation_time)
            .or(Some(pair.created_at));

        let record = TokenRecord {
            address,
            name,
            symbol,
            price,
            market_cap,
            liquidity,
            volume_24h,
            holder_count,
            creation_time,
            whale_holdings,
            top_holders,
            contract_verified: security.contract_verified,
            mint_frozen: security.mint_frozen,
            is_honeypot: security.is_honeypot,
            buy_tax_pct: security.buy_tax_pct,
            sell_tax_pct: security.sell_tax_pct,
            risk_factors,
            volume_trend: volume_trend.class,
            volume_trend_score: volume_trend.score,
            volume_acceleration_pct: volume_trend.acceleration_pct,
            tx_trend: tx_trend.class,
            tx_trend_score: tx_trend.score,
            sources_used,
            stale_fields,
        };

        if record.is_viable() {
            Ok(record)
        } else {
            Err(())
        }
    }
}
