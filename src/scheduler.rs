//! Scheduler Loop (spec §4.12): drives one tick of
//! Discovery → Filter → (cached) Enrichment → Score → Alert Sink, and owns
//! graceful shutdown. Grounded on `main.rs`'s `parallel_data_collection`
//! tick loop — an `interval` ticker combined with channel-driven work inside
//! one `tokio::select!` — and on `DataSourceKillSwitch`'s per-source health
//! bookkeeping, here narrowed to the recheck-interval dedup table the
//! Scheduler itself owns.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::alert::AlertSink;
use crate::batch::BatchCoalescer;
use crate::config::Config;
use crate::discovery::DiscoverySource;
use crate::enrichment::EnrichmentStage;
use crate::filter::FilterStage;
use crate::journal::ScoreJournal;
use crate::model::{Fingerprint, PairCandidate};
use crate::scorer::Scorer;

const PRICE_HISTORY_DEPTH: usize = 20;

pub struct SchedulerConfig {
    pub scan_interval: Duration,
    pub pair_recheck_interval: Duration,
    pub max_inflight: usize,
    pub per_token_budget: Duration,
    pub maintenance_interval: Duration,
    pub min_score: f64,
    pub min_liquidity: f64,
    pub max_liquidity: f64,
    pub max_market_cap: f64,
    pub min_holders: u64,
    pub max_holders: u64,
}

impl SchedulerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            scan_interval: Duration::from_secs(config.scan_interval_s),
            pair_recheck_interval: Duration::from_secs(config.pair_recheck_interval_s),
            max_inflight: config.max_inflight,
            per_token_budget: Duration::from_secs(10),
            maintenance_interval: Duration::from_secs(3600),
            min_score: config.min_score,
            min_liquidity: config.min_liquidity,
            max_liquidity: config.max_liquidity,
            max_market_cap: config.max_market_cap,
            min_holders: config.min_holder_count,
            max_holders: config.max_holder_count,
        }
    }
}

/// Owns one tick's worth of pipeline state: the recheck dedup table and a
/// short rolling price series per token (feeds the Scorer's price-stability
/// sub-score). Both are bounded so a long-running process doesn't leak.
pub struct SchedulerLoop {
    discovery: Arc<dyn DiscoverySource>,
    filter: FilterStage,
    enrichment: Arc<EnrichmentStage>,
    scorer: Scorer,
    alert_sink: Arc<dyn AlertSink>,
    journal: Option<Arc<ScoreJournal>>,
    batch: Arc<BatchCoalescer>,
    config: SchedulerConfig,
    last_seen: Mutex<HashMap<Fingerprint, DateTime<Utc>>>,
    price_history: Mutex<HashMap<Fingerprint, VecDeque<f64>>>,
}

impl SchedulerLoop {
    pub fn new(
        discovery: Arc<dyn DiscoverySource>,
        filter: FilterStage,
        enrichment: Arc<EnrichmentStage>,
        scorer: Scorer,
        alert_sink: Arc<dyn AlertSink>,
        journal: Option<Arc<ScoreJournal>>,
        batch: Arc<BatchCoalescer>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            discovery,
            filter,
            enrichment,
            scorer,
            alert_sink,
            journal,
            batch,
            config,
            last_seen: Mutex::new(HashMap::new()),
            price_history: Mutex::new(HashMap::new()),
        }
    }

    /// `true` iff this pair hasn't been processed within
    /// `pair_recheck_interval` (spec §4.12 step 2); marks it seen as a
    /// side effect when it passes.
    fn is_recheck_due(&self, pair: &PairCandidate, now: DateTime<Utc>) -> bool {
        let recheck = chrono::Duration::from_std(self.config.pair_recheck_interval)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        let mut seen = self.last_seen.lock();
        match seen.get(&pair.pair_id) {
            Some(last) if now - *last < recheck => false,
            _ => {
                seen.insert(pair.pair_id.clone(), now);
                true
            }
        }
    }

    fn push_price(&self, address: &Fingerprint, price: Option<f64>) -> Vec<f64> {
        let mut history = self.price_history.lock();
        let series = history.entry(address.clone()).or_default();
        if let Some(price) = price {
            series.push_back(price);
            while series.len() > PRICE_HISTORY_DEPTH {
                series.pop_front();
            }
        }
        series.iter().copied().collect()
    }

    /// Drives the pipeline forever. Returns once `shutdown` fires and
    /// in-flight enrichment/scoring tasks have drained, or the grace
    /// period following shutdown elapses.
    pub async fn run(self: Arc<Self>, mut shutdown: mpsc::Receiver<()>) {
        let (pair_tx, mut pair_rx) = mpsc::channel::<PairCandidate>(1024);
        let discovery = self.discovery.clone();
        tokio::spawn(async move {
            if let Err(e) = discovery.run(pair_tx).await {
                warn!(error = %e, "discovery source exited");
            }
        });

        let semaphore = Arc::new(Semaphore::new(self.config.max_inflight.max(1)));
        let mut scan_ticker = interval(self.config.scan_interval);
        scan_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut maintenance_ticker = interval(self.config.maintenance_interval);
        maintenance_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut inflight: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                _ = scan_ticker.tick() => {
                    Self::drain_and_dispatch(&self, &mut pair_rx, &semaphore, &mut inflight).await;
                }
                _ = maintenance_ticker.tick() => {
                    self.run_maintenance().await;
                }
                _ = shutdown.recv() => {
                    info!("scheduler shutdown requested, draining in-flight work");
                    break;
                }
            }
        }

        let grace = self.config.per_token_budget + Duration::from_secs(5);
        let drained = timeout(grace, async {
            while inflight.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("shutdown grace period elapsed with tasks still in flight, abandoning them");
            inflight.shutdown().await;
        }

        if let Some(journal) = &self.journal {
            info!(rows = journal.len(), "score journal flushed at shutdown");
        }
    }

    /// One tick (spec §4.12 steps 1-3): drains whatever discovery has pushed
    /// since the last tick, filters it, and spawns a concurrency-capped
    /// enrichment/score/alert task per surviving candidate.
    async fn drain_and_dispatch(
        self: &Arc<Self>,
        pair_rx: &mut mpsc::Receiver<PairCandidate>,
        semaphore: &Arc<Semaphore>,
        inflight: &mut JoinSet<()>,
    ) {
        let mut batch = Vec::new();
        while let Ok(pair) = pair_rx.try_recv() {
            batch.push(pair);
        }
        if batch.is_empty() {
            return;
        }

        let now = Utc::now();
        let mut spawned = 0usize;
        for pair in batch {
            if !self.filter.is_candidate(&pair, now) {
                continue;
            }
            if !self.is_recheck_due(&pair, now) {
                continue;
            }

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            spawned += 1;
            inflight.spawn(Arc::clone(self).process_one(pair, permit));
        }

        while inflight.try_join_next().is_some() {}
        if spawned > 0 {
            debug!(spawned, "scheduler tick dispatched enrichment tasks");
        }
    }

    /// Scores and dispatches a single enriched record (spec §4.12 steps
    /// 4-5). Enrichment is bounded by `per_token_budget`; a task that blows
    /// through it is cancelled and its partial data discarded.
    async fn process_one(self: Arc<Self>, pair: PairCandidate, _permit: tokio::sync::OwnedSemaphorePermit) {
        let record = match timeout(self.config.per_token_budget, self.enrichment.enrich_cached(&pair)).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(pair = %pair.pair_id, "enrichment produced no viable record");
                return;
            }
            Err(_) => {
                warn!(pair = %pair.pair_id, "enrichment exceeded per-token budget, discarding partial data");
                return;
            }
        };

        let price_history = self.push_price(&record.address, record.price);
        let now = Utc::now();
        let score = self.scorer.score(
            &record,
            self.config.min_liquidity,
            self.config.max_liquidity,
            self.config.max_market_cap,
            self.config.min_holders,
            self.config.max_holders,
            &price_history,
            now,
        );
        let score = Scorer::decide(score, self.config.min_score, record.is_honeypot);

        if let Some(journal) = &self.journal {
            if let Err(e) = journal.record(&record, &score, now.timestamp()) {
                warn!(error = %e, "failed to append score journal entry");
            }
        }

        if let Err(e) = self.alert_sink.emit(&score, &record).await {
            warn!(address = %record.address, error = %e, "alert sink returned an error");
        }
    }

    /// Background maintenance (spec §4.12 step 6, default hourly): prunes
    /// the recheck-dedup table so a long-running process doesn't retain an
    /// unbounded address history.
    async fn run_maintenance(&self) {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.config.pair_recheck_interval)
            .unwrap_or_else(|_| chrono::Duration::minutes(5))
            * 24;

        let mut seen = self.last_seen.lock();
        let before = seen.len();
        seen.retain(|_, last| now - *last < ttl);
        let removed = before - seen.len();
        let tracked = seen.len();
        drop(seen);

        let sweep_plan = self.batch.plan_batches(tracked);
        if !sweep_plan.is_empty() {
            debug!(chunks = sweep_plan.len(), tracked, "holder-refresh sweep pre-sized");
        }

        match &self.journal {
            Some(journal) => info!(removed, rows_journaled = journal.len(), "scheduler maintenance sweep complete"),
            None => info!(removed, "scheduler maintenance sweep complete"),
        }
    }
}
