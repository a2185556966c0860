//! Discovery Source (spec §4.7): the pipeline's entry point, producing a
//! stream of newly-seen `PairCandidate`s. Two transports are provided behind
//! one trait — REST polling and a streaming WebSocket feed — matching the
//! teacher's split between `dome_rest.rs` and `dome_websocket.rs`/
//! `polymarket_ws.rs`; the Scheduler is generic over `dyn DiscoverySource`.

mod rest;
mod websocket;

pub use rest::RestDiscoverySource;
pub use websocket::WebSocketDiscoverySource;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::model::PairCandidate;

/// A source of newly-discovered trading pairs. `run` drives the source
/// forever, pushing candidates onto `tx`; it returns only on an
/// unrecoverable error or when `tx` is dropped (the Scheduler shutting down).
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    async fn run(&self, tx: mpsc::Sender<PairCandidate>) -> Result<(), ProviderError>;
}
