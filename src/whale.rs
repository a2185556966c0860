//! Whale/smart-money classification, grounded on
//! `original_source/services/whale_tracker.py::WhaleTracker`.
//!
//! The Python original holds a direct `SmartMoneyAnalyzer` reference inside
//! `WhaleTracker` and calls into it synchronously. A faithful port would
//! need `WhaleClassifier` and `SmartMoneyAnalyzer` to reference each other
//! (the analyzer needs trade history the classifier assembles, the
//! classifier needs the analyzer's verdict) — instead the smart-money pass
//! runs as its own task reachable only through a request channel, the same
//! way `DiscoverySource::run` decouples a producer from its consumer via
//! `mpsc`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::model::Fingerprint;

#[derive(Debug, Clone, Default)]
pub struct SuspiciousPatternsConfig {
    pub new_wallet_max_age_seconds: i64,
    pub high_frequency_min_txns: u64,
}

impl SuspiciousPatternsConfig {
    pub fn defaults() -> Self {
        Self {
            new_wallet_max_age_seconds: 24 * 3600,
            high_frequency_min_txns: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WhaleWallet {
    pub address: Fingerprint,
    pub holdings_pct: f64,
    pub last_activity: DateTime<Utc>,
    pub transaction_count: u64,
    pub is_contract: bool,
    pub wallet_age_seconds: i64,
    pub verified: bool,
    pub risk_factors: Vec<String>,
    pub is_developer_wallet: bool,
}

/// Verdict produced by the smart-money pass for one wallet/token pair.
#[derive(Debug, Clone, Default)]
pub struct SmartMoneyVerdict {
    pub risk_factors: Vec<String>,
    pub is_developer_wallet: bool,
}

pub struct SmartMoneyRequest {
    pub wallet: Fingerprint,
    pub token: Fingerprint,
    pub price_history: Vec<f64>,
    reply: oneshot::Sender<SmartMoneyVerdict>,
}

/// Runs as an independent task; the `WhaleClassifier` only ever sees its
/// `SmartMoneyHandle`, never this type.
pub struct SmartMoneyAnalyzer;

impl SmartMoneyAnalyzer {
    pub fn spawn() -> SmartMoneyHandle {
        let (tx, mut rx) = mpsc::channel::<SmartMoneyRequest>(256);

        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let verdict = Self::analyze(&request);
                let _ = request.reply.send(verdict);
            }
        });

        SmartMoneyHandle { tx }
    }

    /// Trade-pattern heuristic: rapid round-trips on a price series with
    /// very little capital at risk reads as wash-trading; no history at
    /// all yields a neutral verdict rather than a guess.
    fn analyze(request: &SmartMoneyRequest) -> SmartMoneyVerdict {
        let mut risk_factors = Vec::new();
        let mut is_developer_wallet = false;

        if request.price_history.len() >= 4 {
            let reversals = request
                .price_history
                .windows(3)
                .filter(|w| (w[1] - w[0]).signum() != 0.0 && (w[1] - w[0]).signum() != (w[2] - w[1]).signum())
                .count();
            let reversal_ratio = reversals as f64 / request.price_history.len() as f64;
            if reversal_ratio > 0.6 {
                risk_factors.push("wash_trading_pattern".to_string());
                is_developer_wallet = true;
            }
        }

        if is_developer_wallet {
            risk_factors.push("Wallet identified with developer trading patterns".to_string());
        }

        SmartMoneyVerdict {
            risk_factors,
            is_developer_wallet,
        }
    }
}

#[derive(Clone)]
pub struct SmartMoneyHandle {
    tx: mpsc::Sender<SmartMoneyRequest>,
}

impl SmartMoneyHandle {
    pub async fn analyze(&self, wallet: Fingerprint, token: Fingerprint, price_history: Vec<f64>) -> SmartMoneyVerdict {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = SmartMoneyRequest {
            wallet,
            token,
            price_history,
            reply: reply_tx,
        };

        if self.tx.send(request).await.is_err() {
            warn!("smart money analyzer unavailable, returning neutral verdict");
            return SmartMoneyVerdict::default();
        }

        reply_rx.await.unwrap_or_default()
    }
}

pub struct WhaleClassifier {
    config: SuspiciousPatternsConfig,
    smart_money: Option<SmartMoneyHandle>,
}

impl WhaleClassifier {
    pub fn new(config: SuspiciousPatternsConfig, smart_money: Option<SmartMoneyHandle>) -> Self {
        Self { config, smart_money }
    }

    /// Mirrors `_verify_wallet_legitimacy`: a wallet is legitimate only if
    /// it clears both the minimum-age and max-transaction-count gates.
    fn verify_legitimacy(&self, wallet_age_seconds: i64, tx_count: u64) -> (bool, Vec<String>) {
        let mut suspicious = Vec::new();

        if wallet_age_seconds < self.config.new_wallet_max_age_seconds {
            suspicious.push(format!(
                "New wallet (age: {:.1}h < {:.1}h threshold)",
                wallet_age_seconds as f64 / 3600.0,
                self.config.new_wallet_max_age_seconds as f64 / 3600.0
            ));
        }

        if tx_count > self.config.high_frequency_min_txns {
            suspicious.push(format!(
                "High transaction count ({} > {} threshold)",
                tx_count, self.config.high_frequency_min_txns
            ));
        }

        (suspicious.is_empty(), suspicious)
    }

    /// Analyzes a single whale wallet, incorporating the smart-money
    /// verdict when a handle is available.
    pub async fn classify(
        &self,
        address: Fingerprint,
        holdings_pct: f64,
        token_address: Fingerprint,
        wallet_age_seconds: i64,
        transaction_count: u64,
        is_contract: bool,
        price_history: Vec<f64>,
    ) -> WhaleWallet {
        let (verified, mut risk_factors) = self.verify_legitimacy(wallet_age_seconds, transaction_count);

        let mut is_developer_wallet = false;
        if let Some(handle) = &self.smart_money {
            let verdict = handle.analyze(address.clone(), token_address, price_history).await;
            risk_factors.extend(verdict.risk_factors);
            is_developer_wallet = verdict.is_developer_wallet;
        }

        WhaleWallet {
            address,
            holdings_pct,
            last_activity: Utc::now(),
            transaction_count,
            is_contract,
            wallet_age_seconds,
            verified,
            risk_factors,
            is_developer_wallet,
        }
    }

    /// Batch form of `classify`, mirroring `track_whale_movements`: maps a
    /// token's whale-holdings table to per-wallet classifications.
    pub async fn classify_all(
        &self,
        token_address: Fingerprint,
        holdings: &HashMap<Fingerprint, f64>,
        wallet_ages: &HashMap<Fingerprint, i64>,
        transaction_counts: &HashMap<Fingerprint, u64>,
        contract_flags: &HashMap<Fingerprint, bool>,
    ) -> HashMap<Fingerprint, WhaleWallet> {
        let mut analyzed = HashMap::with_capacity(holdings.len());

        for (address, holding_pct) in holdings {
            let age = wallet_ages.get(address).copied().unwrap_or(0);
            let tx_count = transaction_counts.get(address).copied().unwrap_or(0);
            let is_contract = contract_flags.get(address).copied().unwrap_or(false);

            let wallet = self
                .classify(
                    address.clone(),
                    *holding_pct,
                    token_address.clone(),
                    age,
                    tx_count,
                    is_contract,
                    Vec::new(),
                )
                .await;
            analyzed.insert(address.clone(), wallet);
        }

        analyzed
    }
}
