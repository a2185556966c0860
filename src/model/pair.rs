use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::fingerprint::Fingerprint;

/// Buy/sell counts over a window. Untrusted discovery data — all fields
/// default to 0 rather than being `Option`, since a missing count and a
/// genuine zero are indistinguishable at the discovery layer.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TxCounts {
    pub buys: u64,
    pub sells: u64,
}

impl TxCounts {
    pub fn total(&self) -> u64 {
        self.buys + self.sells
    }
}

/// Buy/sell counts sampled over the three horizons the Trend Analyzer needs.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TxCountWindows {
    pub h1: TxCounts,
    pub h6: TxCounts,
    pub h24: TxCounts,
}

/// A freshly-observed trading pair from the Discovery stage (spec §3).
/// Discovery data is untrusted: every market metric is optional, and a
/// missing metric must never be silently treated as zero downstream
/// (the Filter Stage's conservative-on-missing rule depends on this).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairCandidate {
    pub pair_id: Fingerprint,
    pub base_token: Fingerprint,
    pub quote_token: Fingerprint,
    pub created_at: DateTime<Utc>,

    pub price_usd: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub volume_24h_usd: Option<f64>,
    pub market_cap_usd: Option<f64>,

    pub price_change_1h_pct: Option<f64>,
    pub price_change_6h_pct: Option<f64>,
    pub price_change_24h_pct: Option<f64>,

    pub tx_counts: TxCountWindows,
    /// Hourly volume samples (H1/H6/H24), used by the Trend Analyzer.
    pub volume_windows: VolumeWindows,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VolumeWindows {
    pub h1: f64,
    pub h6: f64,
    pub h24: f64,
}

impl PairCandidate {
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }
}
