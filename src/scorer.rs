//! Scorer (spec §4.10): composite weighted score over [0,1] sub-scores.
//! Every sub-score is grounded on `original_source/services/gem_scorer.py`'s
//! `_score_*` methods; the volume bucket breakpoints and the honeypot/tax
//! penalty multipliers are taken from there close to verbatim. The overall
//! weighted-normalize-by-active-weight loop mirrors `calculate_score`, and
//! the additive per-risk-factor penalty style echoes
//! `arbitrage/engine.rs::calculate_confidence`'s bucket scoring. Price
//! stability's log-return volatility is computed by hand (sample variance,
//! then `sqrt`) in the same style as `backtest_v2/metrics.rs`, rather than
//! through the `statrs::statistics` trait the teacher's `risk.rs` imports
//! but never actually calls.

use std::collections::HashMap;

use crate::config::ScoringConfig;
use crate::model::{Decision, Score, TokenRecord, TrendClass};

pub struct Scorer {
    config: ScoringConfig,
}

fn clamp01(value: f64) -> f64 {
    value.max(0.0).min(1.0)
}

impl Scorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    fn score_liquidity(&self, liquidity: Option<f64>, min_liquidity: f64, max_liquidity: f64) -> Option<f64> {
        let liquidity = liquidity?;
        if liquidity <= 0.0 {
            return Some(0.0);
        }
        let min_safe = min_liquidity.max(1.0);
        let max_safe = max_liquidity.max(min_safe + 1.0);
        let log_liq = liquidity.max(1.0).log10();
        let min_log = min_safe.log10();
        let max_log = max_safe.log10();
        if max_log <= min_log {
            return Some(if log_liq >= min_log { 1.0 } else { 0.0 });
        }
        Some(clamp01((log_liq - min_log) / (max_log - min_log)))
    }

    fn score_market_cap(&self, market_cap: Option<f64>, max_market_cap: f64) -> Option<f64> {
        let mcap = market_cap?;
        if mcap <= 0.0 || mcap > max_market_cap {
            return Some(0.0);
        }
        Some(1.0 - (mcap / max_market_cap).sqrt())
    }

    fn score_holders(&self, holder_count: Option<u64>, min_holders: u64, max_holders: u64) -> Option<f64> {
        let holders = holder_count?;
        if holders < min_holders {
            return Some(0.0);
        }
        if holders >= max_holders {
            return Some(1.0);
        }
        if max_holders <= min_holders {
            return Some(1.0);
        }
        let score = (holders - min_holders) as f64 / (max_holders - min_holders) as f64;
        Some(clamp01(score))
    }

    /// `1 - Gini(sorted amounts)`. Empty or single-holder input is maximally
    /// concentrated (spec boundary: "Empty top_holders → 0").
    fn score_holder_distribution(&self, top_holders: &[f64]) -> f64 {
        if top_holders.len() < 2 {
            return 0.0;
        }
        let mut holdings = top_holders.to_vec();
        holdings.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let n = holdings.len() as f64;
        let sum: f64 = holdings.iter().sum();
        if sum == 0.0 {
            return 1.0;
        }

        let rank_weighted_sum: f64 = holdings
            .iter()
            .enumerate()
            .map(|(i, value)| (i as f64 + 1.0) * value)
            .sum();
        let gini = (2.0 * rank_weighted_sum) / (n * sum) - (n + 1.0) / n;
        clamp01(1.0 - gini)
    }

    /// Piecewise by `sum(whale_holdings)` (spec boundary: absent → 1.0).
    fn score_supply_distribution(&self, whale_concentration: f64, has_whale_data: bool) -> f64 {
        if !has_whale_data {
            return 1.0;
        }
        if whale_concentration >= 0.5 {
            0.0
        } else if whale_concentration >= 0.3 {
            0.5 * (1.0 - (whale_concentration - 0.3) / 0.2)
        } else if whale_concentration >= 0.1 {
            1.0 - (whale_concentration / 0.3) * 0.5
        } else {
            1.0
        }
    }

    fn score_security(&self, record: &TokenRecord) -> f64 {
        if record.is_honeypot {
            return 0.0;
        }

        let mut score = 1.0;
        if !record.contract_verified {
            score *= 0.7;
        }

        let total_tax = record.buy_tax_pct + record.sell_tax_pct;
        if total_tax > 20.0 {
            score *= 0.5;
        } else if total_tax > 10.0 {
            score *= 0.75;
        } else if total_tax > 5.0 {
            score *= 0.9;
        }

        for tag in &record.risk_factors {
            if let Some(multiplier) = self.config.risk_penalties.get(tag) {
                score *= multiplier;
            }
        }

        clamp01(score)
    }

    /// `exp(-stdev(log_returns) / volatility_scale)`. Fewer than two returns
    /// is "not enough data", matching `gem_scorer.py`'s 0.3 for that branch.
    fn score_price_stability(&self, price_history: &[f64]) -> f64 {
        let log_returns: Vec<f64> = price_history
            .windows(2)
            .filter(|pair| pair[0] > 0.0 && pair[1] > 0.0)
            .map(|pair| (pair[1] / pair[0]).ln())
            .collect();

        if log_returns.len() < 2 {
            return 0.3;
        }

        let n = log_returns.len() as f64;
        let mean = log_returns.iter().sum::<f64>() / n;
        let variance = log_returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let volatility = variance.sqrt();
        clamp01((-volatility / self.config.volatility_scale).exp())
    }

    fn score_age(&self, creation_time: Option<chrono::DateTime<chrono::Utc>>, now: chrono::DateTime<chrono::Utc>) -> Option<f64> {
        let creation_time = creation_time?;
        let age_hours = (now - creation_time).num_seconds() as f64 / 3600.0;
        if age_hours < 0.0 {
            return Some(0.0);
        }

        let score = if age_hours < 1.0 {
            age_hours
        } else if age_hours < 24.0 {
            0.3 + (age_hours / 24.0) * 0.3
        } else if age_hours < 24.0 * 7.0 {
            0.6 + ((age_hours - 24.0) / (24.0 * 6.0)) * 0.2
        } else {
            (0.8 + (age_hours / (24.0 * 7.0)).max(1.0).log10() * 0.2).min(1.0)
        };
        Some(clamp01(score))
    }

    fn volume_to_mcap_score(&self, volume_24h: Option<f64>, market_cap: Option<f64>) -> Option<f64> {
        let volume = volume_24h?;
        let mcap = market_cap?;
        if mcap <= 0.0 || volume <= 0.0 {
            return Some(0.0);
        }
        let ratio = volume / mcap;
        let score = if ratio >= 1.0 {
            1.0
        } else if ratio >= 0.5 {
            0.8 + (ratio - 0.5) * 0.4
        } else if ratio >= 0.2 {
            0.5 + (ratio - 0.2) / 0.3 * 0.3
        } else if ratio >= 0.05 {
            0.2 + (ratio - 0.05) / 0.15 * 0.3
        } else {
            ratio / 0.05 * 0.2
        };
        Some(clamp01(score))
    }

    fn score_volume_trend(&self, record: &TokenRecord, base_volume_score: Option<f64>) -> Option<f64> {
        let base = base_volume_score?;
        let multiplier = match record.volume_trend {
            TrendClass::StronglyIncreasing => 1.3,
            TrendClass::Increasing => 1.2,
            TrendClass::RecentlyIncreasing => 1.1,
            TrendClass::Stable => 1.0,
            TrendClass::Decreasing => 0.8,
            TrendClass::StronglyDecreasing => 0.6,
            TrendClass::NoActivity | TrendClass::InsufficientData => 0.9,
        };

        let acceleration_bonus = if record.volume_acceleration_pct > 100.0 {
            0.15
        } else if record.volume_acceleration_pct > 50.0 {
            0.07
        } else if record.volume_acceleration_pct < -50.0 {
            -0.1
        } else {
            0.0
        };

        Some(clamp01(base * multiplier + acceleration_bonus))
    }

    fn score_transaction_trend(&self, record: &TokenRecord) -> f64 {
        match record.tx_trend {
            TrendClass::StronglyIncreasing => 1.0,
            TrendClass::Increasing => 0.85,
            TrendClass::RecentlyIncreasing => 0.7,
            TrendClass::Stable => 0.5,
            TrendClass::Decreasing => 0.3,
            TrendClass::StronglyDecreasing => 0.15,
            TrendClass::NoActivity | TrendClass::InsufficientData => 0.4,
        }
    }

    fn score_smart_contract(&self, record: &TokenRecord) -> f64 {
        let mut score: f64 = 0.5;
        if record.mint_frozen {
            score += 0.25;
        }
        if record.contract_verified {
            score += 0.25;
        }
        clamp01(score)
    }

    /// Scores a `TokenRecord` against the supplied bounds, sub-score
    /// weights, and an optional recent price series (for price stability).
    /// Deterministic: identical inputs produce an identical `Score`.
    pub fn score(
        &self,
        record: &TokenRecord,
        min_liquidity: f64,
        max_liquidity: f64,
        max_market_cap: f64,
        min_holders: u64,
        max_holders: u64,
        price_history: &[f64],
        now: chrono::DateTime<chrono::Utc>,
    ) -> Score {
        if record.is_honeypot {
            let mut breakdown = HashMap::new();
            breakdown.insert("security".to_string(), 0.0);
            return Score {
                total: 0.0,
                breakdown,
                risk_factors: record.risk_factors.iter().cloned().collect(),
                decision: Decision::Discard,
            };
        }

        let whale_concentration = record.whale_concentration();
        let has_whale_data = !record.whale_holdings.is_empty();
        let top_holder_amounts: Vec<f64> = record.top_holders.iter().map(|h| h.amount).collect();
        let base_volume_score = self.volume_to_mcap_score(record.volume_24h, record.market_cap);

        let mut sub_scores: HashMap<String, Option<f64>> = HashMap::new();
        sub_scores.insert(
            "liquidity".to_string(),
            self.score_liquidity(record.liquidity, min_liquidity, max_liquidity),
        );
        sub_scores.insert(
            "market_cap".to_string(),
            self.score_market_cap(record.market_cap, max_market_cap),
        );
        sub_scores.insert(
            "holders".to_string(),
            self.score_holders(record.holder_count, min_holders, max_holders),
        );
        sub_scores.insert(
            "holder_distribution".to_string(),
            Some(self.score_holder_distribution(&top_holder_amounts)),
        );
        sub_scores.insert(
            "supply_distribution".to_string(),
            Some(self.score_supply_distribution(whale_concentration, has_whale_data)),
        );
        sub_scores.insert("security".to_string(), Some(self.score_security(record)));
        sub_scores.insert(
            "price_stability".to_string(),
            Some(self.score_price_stability(price_history)),
        );
        sub_scores.insert("age".to_string(), self.score_age(record.creation_time, now));
        sub_scores.insert("volume".to_string(), base_volume_score);
        sub_scores.insert(
            "volume_trend".to_string(),
            self.score_volume_trend(record, base_volume_score),
        );
        sub_scores.insert(
            "transaction_trend".to_string(),
            Some(self.score_transaction_trend(record)),
        );
        sub_scores.insert("smart_contract".to_string(), Some(self.score_smart_contract(record)));

        let mut total_weighted = 0.0;
        let mut active_weight_sum = 0.0;
        let mut breakdown = HashMap::new();

        for (name, value) in &sub_scores {
            let weight = self.config.weights.get(name).copied().unwrap_or(0.0);
            if let Some(value) = value {
                breakdown.insert(name.clone(), value * 100.0);
                if weight > 0.0 {
                    total_weighted += value * weight;
                    active_weight_sum += weight;
                }
            }
        }

        let total = if active_weight_sum > 0.0 {
            (total_weighted / active_weight_sum * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };

        Score {
            total,
            breakdown,
            risk_factors: record.risk_factors.iter().cloned().collect(),
            decision: Decision::Discard,
        }
    }

    /// Applies the spec §4.10 decision rule on top of an already-computed
    /// `Score`: alert iff `total >= min_score` and not a honeypot.
    pub fn decide(mut score: Score, min_score: f64, is_honeypot: bool) -> Score {
        score.decision = if !is_honeypot && score.total >= min_score {
            Decision::Alert
        } else {
            Decision::Discard
        };
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Fingerprint, HolderEntry};
    use std::collections::{HashMap as StdHashMap, HashSet};

    fn base_record() -> TokenRecord {
        TokenRecord {
            address: Fingerprint::new("token"),
            name: "Gem".to_string(),
            symbol: "GEM".to_string(),
            price: Some(1.0),
            market_cap: Some(800_000.0),
            liquidity: Some(50_000.0),
            volume_24h: Some(200_000.0),
            holder_count: Some(300),
            creation_time: Some(chrono::Utc::now() - chrono::Duration::hours(10)),
            whale_holdings: StdHashMap::new(),
            top_holders: vec![
                HolderEntry { address: Fingerprint::new("a"), amount: 0.08 },
                HolderEntry { address: Fingerprint::new("b"), amount: 0.04 },
            ],
            contract_verified: true,
            mint_frozen: false,
            is_honeypot: false,
            buy_tax_pct: 0.0,
            sell_tax_pct: 0.0,
            risk_factors: HashSet::new(),
            volume_trend: TrendClass::StronglyIncreasing,
            volume_trend_score: 1.0,
            volume_acceleration_pct: 150.0,
            tx_trend: TrendClass::StronglyIncreasing,
            tx_trend_score: 1.0,
            sources_used: HashSet::new(),
            stale_fields: HashSet::new(),
        }
    }

    fn strong_gem_record() -> TokenRecord {
        TokenRecord {
            market_cap: Some(500_000.0),
            liquidity: Some(9_000_000.0),
            volume_24h: Some(400_000.0),
            holder_count: Some(45_000),
            creation_time: Some(chrono::Utc::now() - chrono::Duration::hours(2)),
            ..base_record()
        }
    }

    fn scorer() -> Scorer {
        Scorer::new(ScoringConfig::default())
    }

    #[test]
    fn honeypot_forces_zero_total_and_discard() {
        let mut record = base_record();
        record.is_honeypot = true;
        let score = scorer().score(&record, 1_000.0, 10_000_000.0, 50_000_000.0, 10, 50_000, &[], chrono::Utc::now());
        assert_eq!(score.total, 0.0);
        assert_eq!(score.decision, Decision::Discard);
    }

    #[test]
    fn happy_path_scores_above_threshold() {
        let record = strong_gem_record();
        let score = scorer().score(&record, 1_000.0, 10_000_000.0, 50_000_000.0, 10, 50_000, &[], chrono::Utc::now());
        let score = Scorer::decide(score, 70.0, false);
        assert!(score.total >= 70.0, "total was {}", score.total);
        assert_eq!(score.decision, Decision::Alert);
    }

    #[test]
    fn empty_top_holders_scores_zero_distribution() {
        let mut record = base_record();
        record.top_holders.clear();
        let score = scorer().score(&record, 1_000.0, 10_000_000.0, 50_000_000.0, 10, 50_000, &[], chrono::Utc::now());
        assert_eq!(score.breakdown.get("holder_distribution"), Some(&0.0));
    }

    #[test]
    fn absent_whale_holdings_scores_full_supply_distribution() {
        let record = base_record();
        let score = scorer().score(&record, 1_000.0, 10_000_000.0, 50_000_000.0, 10, 50_000, &[], chrono::Utc::now());
        assert_eq!(score.breakdown.get("supply_distribution"), Some(&100.0));
    }

    #[test]
    fn liquidity_at_min_bound_scores_zero() {
        let record = base_record();
        let score = scorer().score(&record, 50_000.0, 10_000_000.0, 50_000_000.0, 10, 50_000, &[], chrono::Utc::now());
        assert_eq!(score.breakdown.get("liquidity"), Some(&0.0));
    }

    #[test]
    fn mcap_above_max_scores_zero() {
        let mut record = base_record();
        record.market_cap = Some(100_000_000.0);
        let score = scorer().score(&record, 1_000.0, 10_000_000.0, 50_000_000.0, 10, 50_000, &[], chrono::Utc::now());
        assert_eq!(score.breakdown.get("market_cap"), Some(&0.0));
    }

    #[test]
    fn scoring_is_deterministic() {
        let record = base_record();
        let scorer = scorer();
        let now = chrono::Utc::now();
        let a = scorer.score(&record, 1_000.0, 10_000_000.0, 50_000_000.0, 10, 50_000, &[], now);
        let b = scorer.score(&record, 1_000.0, 10_000_000.0, 50_000_000.0, 10, 50_000, &[], now);
        assert_eq!(a.total, b.total);
    }
}
