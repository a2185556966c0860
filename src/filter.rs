//! Filter Stage (spec §4.7): fast reject by liquidity/age/activity gates
//! before the expensive Enrichment fan-out runs. Grounded on
//! `original_source/services/filtering_service.py`'s delegation to the
//! trend analyzer for trend-gated filtering.

use std::collections::HashMap;

use crate::config::Config;
use crate::model::PairCandidate;
use crate::trend::{TrendAnalyzer, TrendSample};

/// A bound on one numeric metric. A gate whose metric is missing from the
/// candidate always fails — conservative-on-missing per spec §4.7.
#[derive(Debug, Clone, Copy, Default)]
pub struct Range {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub exact: Option<f64>,
}

impl Range {
    pub fn matches(&self, value: f64) -> bool {
        if let Some(exact) = self.exact {
            return (value - exact).abs() < f64::EPSILON;
        }
        if let Some(min) = self.min {
            if value < min {
                return false;
            }
        }
        if let Some(max) = self.max {
            if value > max {
                return false;
            }
        }
        true
    }
}

/// A named conjunction of metric ranges a candidate may satisfy instead of
/// (or in addition to) the primary gates.
#[derive(Debug, Clone, Default)]
pub struct RiskProfile {
    pub name: String,
    pub market_cap: Option<Range>,
    pub age_hours: Option<Range>,
    pub tx_24h: Option<Range>,
    pub volume_24h: Option<Range>,
    pub price_change_1h_pct: Option<Range>,
    pub price_change_6h_pct: Option<Range>,
    pub price_change_24h_pct: Option<Range>,
}

impl RiskProfile {
    fn matches(&self, pair: &PairCandidate, age_hours: f64) -> bool {
        let checks: [(Option<Range>, Option<f64>); 6] = [
            (self.market_cap, pair.market_cap_usd),
            (self.age_hours, Some(age_hours)),
            (self.tx_24h, Some(pair.tx_counts.h24.total() as f64)),
            (self.volume_24h, pair.volume_24h_usd),
            (self.price_change_1h_pct, pair.price_change_1h_pct),
            (self.price_change_6h_pct, pair.price_change_6h_pct),
        ];
        checks.iter().all(|(range, value)| match (range, value) {
            (Some(range), Some(value)) => range.matches(*value),
            (Some(_), None) => false,
            (None, _) => true,
        })
    }
}

pub struct FilterConfig {
    pub min_liquidity: f64,
    pub max_liquidity: f64,
    pub max_market_cap: f64,
    pub max_pair_age_hours: f64,
    pub trend_gating_enabled: bool,
    pub min_volume_trend_score: f64,
    pub min_trend_acceleration_pct: f64,
    pub min_tx_trend_score: f64,
    pub risk_profiles: Vec<RiskProfile>,
}

impl FilterConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_liquidity: config.min_liquidity,
            max_liquidity: config.max_liquidity,
            max_market_cap: config.max_market_cap,
            max_pair_age_hours: config.max_pair_age_hours as f64,
            trend_gating_enabled: false,
            min_volume_trend_score: 0.0,
            min_trend_acceleration_pct: 0.0,
            min_tx_trend_score: 0.0,
            risk_profiles: Vec::new(),
        }
    }
}

pub struct FilterStage {
    config: FilterConfig,
    trend_analyzer: TrendAnalyzer,
}

impl FilterStage {
    pub fn new(config: FilterConfig) -> Self {
        Self {
            config,
            trend_analyzer: TrendAnalyzer::new(),
        }
    }

    /// Spec §4.7 gate conjunction. `now` is injected for determinism in tests.
    pub fn is_candidate(&self, pair: &PairCandidate, now: chrono::DateTime<chrono::Utc>) -> bool {
        let age_hours = pair.age(now).num_seconds() as f64 / 3600.0;

        let liquidity_ok = match pair.liquidity_usd {
            Some(liq) => liq >= self.config.min_liquidity && liq <= self.config.max_liquidity,
            None => false,
        };
        if !liquidity_ok {
            return false;
        }

        let market_cap_ok = match pair.market_cap_usd {
            Some(mcap) => mcap <= self.config.max_market_cap,
            None => false,
        };
        if !market_cap_ok {
            return false;
        }

        if age_hours > self.config.max_pair_age_hours {
            return false;
        }

        if self.config.trend_gating_enabled {
            let volume_sample = TrendSample {
                h1: pair.volume_windows.h1,
                h6: pair.volume_windows.h6,
                h24: pair.volume_windows.h24,
            };
            let volume_trend = self.trend_analyzer.analyze(volume_sample);
            if volume_trend.score < self.config.min_volume_trend_score
                || volume_trend.acceleration_pct < self.config.min_trend_acceleration_pct
            {
                return false;
            }

            let tx_sample = TrendSample {
                h1: pair.tx_counts.h1.total() as f64,
                h6: pair.tx_counts.h6.total() as f64,
                h24: pair.tx_counts.h24.total() as f64,
            };
            let tx_trend = self.trend_analyzer.analyze(tx_sample);
            if tx_trend.score < self.config.min_tx_trend_score {
                return false;
            }
        }

        if !self.config.risk_profiles.is_empty() {
            let passes_a_profile = self
                .config
                .risk_profiles
                .iter()
                .any(|profile| profile.matches(pair, age_hours));
            if !passes_a_profile {
                return false;
            }
        }

        true
    }
}
