//! Streaming WebSocket discovery source. Grounded on
//! `scrapers/dome_websocket.rs`'s auto-reconnect loop (doubling backoff
//! capped at 60s) and subscribe-message shape.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::DiscoverySource;
use crate::error::ProviderError;
use crate::model::{Fingerprint, PairCandidate, TxCountWindows, VolumeWindows};

#[derive(Debug, Serialize)]
struct SubscribeMessage<'a> {
    action: &'a str,
    channel: &'a str,
}

#[derive(Debug, Deserialize)]
struct WsPairEvent {
    address: String,
    base_mint: String,
    quote_mint: String,
    #[serde(default)]
    price_usd: Option<f64>,
    #[serde(default)]
    liquidity_usd: Option<f64>,
}

pub struct WebSocketDiscoverySource {
    url: String,
}

impl WebSocketDiscoverySource {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    async fn connect_and_stream(&self, tx: &mpsc::Sender<PairCandidate>) -> Result<(), ProviderError> {
        let (mut stream, _response) = connect_async(&self.url)
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        let subscribe = SubscribeMessage {
            action: "subscribe",
            channel: "new_pairs",
        };
        let payload = serde_json::to_string(&subscribe)
            .map_err(|e| ProviderError::BadResponse(e.to_string()))?;
        use futures_util::SinkExt;
        stream
            .send(Message::Text(payload))
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        while let Some(message) = stream.next().await {
            let message = message.map_err(|e| ProviderError::Transient(e.to_string()))?;
            let text = match message {
                Message::Text(text) => text,
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(_) => {
                    info!("discovery websocket closed by server");
                    return Ok(());
                }
                _ => continue,
            };

            let event: WsPairEvent = match serde_json::from_str(&text) {
                Ok(event) => event,
                Err(e) => {
                    debug!(error = %e, "unparseable discovery websocket message, skipping");
                    continue;
                }
            };

            let pair = PairCandidate {
                pair_id: Fingerprint::new(event.address.clone()),
                base_token: Fingerprint::new(event.base_mint),
                quote_token: Fingerprint::new(event.quote_mint),
                created_at: Utc::now(),
                price_usd: event.price_usd,
                liquidity_usd: event.liquidity_usd,
                volume_24h_usd: None,
                market_cap_usd: None,
                price_change_1h_pct: None,
                price_change_6h_pct: None,
                price_change_24h_pct: None,
                tx_counts: TxCountWindows::default(),
                volume_windows: VolumeWindows::default(),
            };

            if tx.send(pair).await.is_err() {
                return Ok(());
            }
        }

        Ok(())
    }
}

#[async_trait]
impl DiscoverySource for WebSocketDiscoverySource {
    async fn run(&self, tx: mpsc::Sender<PairCandidate>) -> Result<(), ProviderError> {
        let mut reconnect_delay = Duration::from_secs(1);
        let max_reconnect_delay = Duration::from_secs(60);

        loop {
            match self.connect_and_stream(&tx).await {
                Ok(()) if tx.is_closed() => return Ok(()),
                Ok(()) => {
                    reconnect_delay = Duration::from_secs(1);
                }
                Err(e) => {
                    warn!(error = %e, ?reconnect_delay, "discovery websocket stream ended, reconnecting");
                }
            }

            sleep(reconnect_delay).await;
            reconnect_delay = (reconnect_delay * 2).min(max_reconnect_delay);
        }
    }
}
