//! Configuration (spec §6, §10.3).
//!
//! Loaded once at startup: an optional TOML file supplies the structured
//! sections (`rate_limits`, `providers`, `scoring`, `alerts`), then
//! environment variables override individual top-level scalars — the same
//! two-step precedence the teacher's `Config::from_env` uses, just with a
//! file layer folded in underneath.

use std::collections::HashMap;
use std::env;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GemFinderError;

/// Wraps a secret so it is never accidentally logged via `{:?}`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Secret(String);

impl Secret {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<redacted>")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub base_interval_ms: u64,
    pub min_interval_ms: u64,
    pub max_interval_ms: u64,
    pub backoff_multiplier: f64,
    pub success_reduction: f64,
    pub optimization_threshold: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: 200,
            min_interval_ms: 100,
            max_interval_ms: 5_000,
            backoff_multiplier: 2.0,
            success_reduction: 0.9,
            optimization_threshold: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key_env: Option<String>,
    pub enabled: bool,
}

impl ProviderConfig {
    /// Reads the API key from the environment variable named by
    /// `api_key_env`. Never logged.
    pub fn api_key(&self) -> Option<Secret> {
        self.api_key_env
            .as_ref()
            .and_then(|var| env::var(var).ok())
            .map(Secret)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key_env: None,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub weights: HashMap<String, f64>,
    pub volatility_scale: f64,
    pub risk_penalties: HashMap<String, f64>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let mut weights = HashMap::new();
        weights.insert("liquidity".into(), 0.20);
        weights.insert("market_cap".into(), 0.15);
        weights.insert("holders".into(), 0.15);
        weights.insert("volume".into(), 0.10);
        weights.insert("holder_distribution".into(), 0.10);
        weights.insert("supply_distribution".into(), 0.10);
        weights.insert("security".into(), 0.08);
        weights.insert("price_stability".into(), 0.04);
        weights.insert("age".into(), 0.03);
        weights.insert("volume_trend".into(), 0.03);
        weights.insert("transaction_trend".into(), 0.02);

        Self {
            weights,
            volatility_scale: 0.1,
            risk_penalties: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    pub enabled: bool,
    pub cooldown_s: u64,
    pub score_bump_for_resend: f64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_s: 30 * 60,
            score_bump_for_resend: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub min_liquidity: f64,
    pub max_liquidity: f64,
    pub min_market_cap: f64,
    pub max_market_cap: f64,
    pub min_holder_count: u64,
    pub max_holder_count: u64,
    pub whale_threshold: f64,
    pub top_holders_limit: usize,
    pub price_discrepancy_threshold_pct: f64,
    pub min_score: f64,
    pub scan_interval_s: u64,
    pub max_inflight: usize,
    pub pair_recheck_interval_s: u64,
    pub max_pair_age_hours: u64,

    pub rate_limits: HashMap<String, RateLimitConfig>,
    pub providers: HashMap<String, ProviderConfig>,
    pub scoring: ScoringConfig,
    pub alerts: AlertConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_liquidity: 1_000.0,
            max_liquidity: 10_000_000.0,
            min_market_cap: 0.0,
            max_market_cap: 50_000_000.0,
            min_holder_count: 10,
            max_holder_count: 50_000,
            whale_threshold: 0.05,
            top_holders_limit: 20,
            price_discrepancy_threshold_pct: 5.0,
            min_score: 70.0,
            scan_interval_s: 30,
            max_inflight: 32,
            pair_recheck_interval_s: 5 * 60,
            max_pair_age_hours: 72,

            rate_limits: HashMap::new(),
            providers: HashMap::new(),
            scoring: ScoringConfig::default(),
            alerts: AlertConfig::default(),
        }
    }
}

impl Config {
    /// Loads an optional TOML document, then applies env-var overrides for
    /// the scalar top-level keys (spec §6: "Environment variables override
    /// file values for secrets" — extended here to all top-level scalars,
    /// matching the teacher's `Config::from_env` which reads every field
    /// from the environment with a typed fallback).
    pub fn load(toml_path: Option<&str>) -> Result<Self, GemFinderError> {
        dotenv::dotenv().ok();

        let mut config = match toml_path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    GemFinderError::Configuration(format!("reading {path}: {e}"))
                })?;
                toml::from_str(&text)
                    .map_err(|e| GemFinderError::Configuration(format!("parsing {path}: {e}")))?
            }
            None => Config::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        macro_rules! override_from_env {
            ($field:ident, $var:literal) => {
                if let Ok(v) = env::var($var) {
                    if let Ok(parsed) = v.parse() {
                        self.$field = parsed;
                    }
                }
            };
        }

        override_from_env!(min_liquidity, "MIN_LIQUIDITY");
        override_from_env!(max_liquidity, "MAX_LIQUIDITY");
        override_from_env!(min_market_cap, "MIN_MARKET_CAP");
        override_from_env!(max_market_cap, "MAX_MARKET_CAP");
        override_from_env!(min_holder_count, "MIN_HOLDER_COUNT");
        override_from_env!(max_holder_count, "MAX_HOLDER_COUNT");
        override_from_env!(whale_threshold, "WHALE_THRESHOLD");
        override_from_env!(top_holders_limit, "TOP_HOLDERS_LIMIT");
        override_from_env!(price_discrepancy_threshold_pct, "PRICE_DISCREPANCY_THRESHOLD_PCT");
        override_from_env!(min_score, "MIN_SCORE");
        override_from_env!(scan_interval_s, "SCAN_INTERVAL_S");
        override_from_env!(max_inflight, "MAX_INFLIGHT");
        override_from_env!(pair_recheck_interval_s, "PAIR_RECHECK_INTERVAL_S");
        override_from_env!(max_pair_age_hours, "MAX_PAIR_AGE_HOURS");
    }

    /// Fatal-at-startup validation (spec §7 Configuration errors).
    fn validate(&self) -> Result<(), GemFinderError> {
        if self.min_liquidity > self.max_liquidity {
            return Err(GemFinderError::Configuration(
                "min_liquidity must be <= max_liquidity".into(),
            ));
        }
        if self.min_holder_count > self.max_holder_count {
            return Err(GemFinderError::Configuration(
                "min_holder_count must be <= max_holder_count".into(),
            ));
        }
        let weight_sum: f64 = self.scoring.weights.values().sum();
        if weight_sum <= 0.0 {
            return Err(GemFinderError::Configuration(
                "scoring.weights must sum to a positive value".into(),
            ));
        }
        Ok(())
    }

    pub fn rate_limit_for(&self, domain: &str) -> RateLimitConfig {
        self.rate_limits
            .get(domain)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_inverted_liquidity_bounds() {
        let mut config = Config::default();
        config.min_liquidity = 100.0;
        config.max_liquidity = 10.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_weight_sum() {
        let mut config = Config::default();
        config.scoring.weights.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn secret_debug_is_redacted() {
        let secret = Secret("super-secret-key".to_string());
        assert_eq!(format!("{secret:?}"), "<redacted>");
    }
}
