use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::fingerprint::Fingerprint;

/// Trend classification shared by volume and transaction-count trends
/// (spec §4.9). The ordering here is purely descriptive; scoring reads the
/// paired `_score` field, never the variant itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendClass {
    NoActivity,
    StronglyIncreasing,
    Increasing,
    RecentlyIncreasing,
    Stable,
    Decreasing,
    StronglyDecreasing,
    InsufficientData,
}

impl Default for TrendClass {
    fn default() -> Self {
        TrendClass::InsufficientData
    }
}

/// One entry in the ordered top-holders list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HolderEntry {
    pub address: Fingerprint,
    pub amount: f64,
}

/// The enriched subject of scoring (spec §3 `TokenRecord`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    // Identity
    pub address: Fingerprint,
    pub name: String,
    pub symbol: String,

    // Market
    pub price: Option<f64>,
    pub market_cap: Option<f64>,
    pub liquidity: Option<f64>,
    pub volume_24h: Option<f64>,
    pub holder_count: Option<u64>,
    pub creation_time: Option<DateTime<Utc>>,

    // Distribution
    pub whale_holdings: HashMap<Fingerprint, f64>,
    pub top_holders: Vec<HolderEntry>,

    // Security
    pub contract_verified: bool,
    pub mint_frozen: bool,
    pub is_honeypot: bool,
    pub buy_tax_pct: f64,
    pub sell_tax_pct: f64,
    pub risk_factors: HashSet<String>,

    // Trend
    pub volume_trend: TrendClass,
    pub volume_trend_score: f64,
    pub volume_acceleration_pct: f64,
    pub tx_trend: TrendClass,
    pub tx_trend_score: f64,

    // Provenance
    pub sources_used: HashSet<String>,
    pub stale_fields: HashSet<String>,
}

impl TokenRecord {
    /// Minimum-viable-record check (spec §4.8): identity fields must be
    /// establishable and at least one of price/liquidity must be known.
    pub fn is_viable(&self) -> bool {
        !self.address.as_str().is_empty()
            && !self.symbol.is_empty()
            && (self.price.is_some() || self.liquidity.is_some())
    }

    /// Sum of `whale_holdings` fractions. May legitimately exceed 1.0 when
    /// whale wallets double as LP accounts (spec §3 documented edge case) —
    /// this is not clamped or renormalized anywhere downstream.
    pub fn whale_concentration(&self) -> f64 {
        self.whale_holdings.values().sum()
    }
}
