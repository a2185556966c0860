//! Alert Sink (spec §4.11): delivers a `Score`/`TokenRecord` pair to an
//! external channel, deduplicated per address. The per-address rolling-state
//! `HashMap` gate is grounded on `signals/quality.rs`'s `SignalQualityGate`;
//! the webhook delivery itself follows `providers/http.rs`'s
//! timeout-bounded `reqwest::Client` usage.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::model::{Decision, Score, TokenRecord};

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn emit(&self, score: &Score, record: &TokenRecord) -> Result<(), ProviderError>;
}

#[derive(Debug, Serialize)]
struct AlertPayload<'a> {
    address: &'a str,
    name: &'a str,
    symbol: &'a str,
    score: f64,
    breakdown: &'a HashMap<String, f64>,
    risk_factors: &'a [String],
}

/// Posts a rendered alert to a chat-service webhook. Delivery failures are
/// the caller's to log (spec §4.11: "fire-and-forget"); this type never
/// retries, matching the spec's "emissions... do not block the pipeline".
pub struct WebhookAlertSink {
    client: reqwest::Client,
    webhook_url: String,
}

impl WebhookAlertSink {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client builds with static config");
        Self {
            client,
            webhook_url: webhook_url.into(),
        }
    }

    fn render_text(score: &Score, record: &TokenRecord) -> String {
        format!(
            "🔎 {} ({}) scored {:.1} — {}",
            record.name,
            record.symbol,
            score.total,
            record.address.as_str()
        )
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn emit(&self, score: &Score, record: &TokenRecord) -> Result<(), ProviderError> {
        let payload = AlertPayload {
            address: record.address.as_str(),
            name: &record.name,
            symbol: &record.symbol,
            score: score.total,
            breakdown: &score.breakdown,
            risk_factors: &score.risk_factors,
        };

        let body = serde_json::json!({
            "text": Self::render_text(score, record),
            "payload": payload,
        });

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::BadResponse(format!(
                "alert webhook returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

struct AlertState {
    last_score: f64,
    last_emitted_at: DateTime<Utc>,
}

/// Wraps an `AlertSink`, suppressing repeat emissions for the same address
/// within `cooldown` unless the score has risen by at least `bump` (spec
/// §4.11). One `AlertState` per address, keyed by `HashMap` the same way
/// `SignalQualityGate` keys `RollingStats` per signal family.
pub struct DedupingAlertSink<S: AlertSink> {
    inner: S,
    cooldown: chrono::Duration,
    bump: f64,
    state: Mutex<HashMap<String, AlertState>>,
}

impl<S: AlertSink> DedupingAlertSink<S> {
    pub fn new(inner: S, cooldown: Duration, bump: f64) -> Self {
        let cooldown = chrono::Duration::from_std(cooldown)
            .unwrap_or_else(|_| chrono::Duration::minutes(30));
        Self {
            inner,
            cooldown,
            bump,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` and records the emission if this score should be sent
    /// now; `now` is injected for deterministic tests.
    fn should_emit(&self, address: &str, score: f64, now: DateTime<Utc>) -> bool {
        let mut state = self.state.lock();
        match state.get(address) {
            None => {
                state.insert(
                    address.to_string(),
                    AlertState {
                        last_score: score,
                        last_emitted_at: now,
                    },
                );
                true
            }
            Some(existing) => {
                let cooldown_elapsed = now - existing.last_emitted_at >= self.cooldown;
                let bumped = score - existing.last_score >= self.bump;
                if cooldown_elapsed || bumped {
                    state.insert(
                        address.to_string(),
                        AlertState {
                            last_score: score,
                            last_emitted_at: now,
                        },
                    );
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Evaluates the dedup gate against the current time and, if it passes,
    /// delegates to the inner sink.
    pub async fn emit_at(&self, score: &Score, record: &TokenRecord, now: DateTime<Utc>) {
        if score.decision != Decision::Alert {
            return;
        }

        if !self.should_emit(record.address.as_str(), score.total, now) {
            debug!(address = %record.address, score = score.total, "alert suppressed by cooldown/bump gate");
            return;
        }

        if let Err(e) = self.inner.emit(score, record).await {
            warn!(address = %record.address, error = %e, "alert delivery failed");
        }
    }
}

#[async_trait]
impl<S: AlertSink> AlertSink for DedupingAlertSink<S> {
    async fn emit(&self, score: &Score, record: &TokenRecord) -> Result<(), ProviderError> {
        self.emit_at(score, record, Utc::now()).await;
        Ok(())
    }
}
