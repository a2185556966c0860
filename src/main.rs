//! Gem-finder backend entry point.
//!
//! Wires concrete providers, the rate limiter/circuit breaker pair each one
//! shares, the discovery source, and the pipeline stages into one
//! `SchedulerLoop`, then runs it until SIGINT/SIGTERM.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use gemfinder_backend::alert::{DedupingAlertSink, WebhookAlertSink};
use gemfinder_backend::batch::{BatchCoalescer, BatchConfig};
use gemfinder_backend::circuit_breaker::CircuitBreaker;
use gemfinder_backend::config::Config;
use gemfinder_backend::discovery::{DiscoverySource, RestDiscoverySource, WebSocketDiscoverySource};
use gemfinder_backend::enrichment::{EnrichmentConfig, EnrichmentStage};
use gemfinder_backend::filter::{FilterConfig, FilterStage};
use gemfinder_backend::journal::ScoreJournal;
use gemfinder_backend::providers::{BirdeyeLikeProvider, ProviderClient, SolscanLikeProvider};
use gemfinder_backend::rate_limiter::RateLimiter;
use gemfinder_backend::scheduler::{SchedulerConfig, SchedulerLoop};
use gemfinder_backend::scorer::Scorer;

const SOLSCAN_DOMAIN: &str = "solscan_like";
const BIRDEYE_DOMAIN: &str = "birdeye_like";
const CIRCUIT_FAILURE_THRESHOLD: u32 = 5;
const CIRCUIT_COOLDOWN: Duration = Duration::from_secs(60);

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gemfinder_backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config_path = env::var("GEMFINDER_CONFIG").ok();
    let config = Config::load(config_path.as_deref()).context("loading configuration")?;

    let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_for("default")));
    rate_limiter.configure_domain(SOLSCAN_DOMAIN, config.rate_limit_for(SOLSCAN_DOMAIN));
    rate_limiter.configure_domain(BIRDEYE_DOMAIN, config.rate_limit_for(BIRDEYE_DOMAIN));

    let solscan_breaker = Arc::new(CircuitBreaker::new(
        SOLSCAN_DOMAIN,
        CIRCUIT_FAILURE_THRESHOLD,
        CIRCUIT_COOLDOWN,
    ));
    let birdeye_breaker = Arc::new(CircuitBreaker::new(
        BIRDEYE_DOMAIN,
        CIRCUIT_FAILURE_THRESHOLD,
        CIRCUIT_COOLDOWN,
    ));

    let solscan_cfg = config.providers.get(SOLSCAN_DOMAIN).cloned().unwrap_or_default();
    let birdeye_cfg = config.providers.get(BIRDEYE_DOMAIN).cloned().unwrap_or_default();

    let primary: Arc<dyn ProviderClient> = Arc::new(SolscanLikeProvider::new(
        solscan_cfg.base_url.clone(),
        solscan_cfg.api_key().map(|s| s.expose().to_string()),
        rate_limiter.clone(),
        solscan_breaker,
    ));

    let birdeye_provider = Arc::new(BirdeyeLikeProvider::new(
        birdeye_cfg.base_url.clone(),
        birdeye_cfg
            .api_key()
            .map(|s| s.expose().to_string())
            .unwrap_or_default(),
        rate_limiter.clone(),
        birdeye_breaker.clone(),
    ));
    let birdeye_cost_meter = birdeye_provider.cost_meter();
    let secondary_price: Arc<dyn ProviderClient> = birdeye_provider;

    let discovery: Arc<dyn DiscoverySource> = if env::var("GEMFINDER_DISCOVERY_WS").is_ok() {
        Arc::new(WebSocketDiscoverySource::new(
            env::var("GEMFINDER_DISCOVERY_WS_URL")
                .unwrap_or_else(|_| "wss://example-feed.invalid/pairs".to_string()),
        ))
    } else {
        Arc::new(RestDiscoverySource::new(
            birdeye_cfg.base_url.clone(),
            birdeye_cfg.api_key().map(|s| s.expose().to_string()),
            Duration::from_secs(config.scan_interval_s),
            rate_limiter.clone(),
            birdeye_breaker,
        ))
    };

    let filter = FilterStage::new(FilterConfig::from_config(&config));
    let enrichment = Arc::new(EnrichmentStage::new(
        primary,
        secondary_price,
        EnrichmentConfig::from_config(&config),
    ));
    let scorer = Scorer::new(config.scoring.clone());

    let webhook_url = env::var("GEMFINDER_WEBHOOK_URL")
        .unwrap_or_else(|_| "https://example-webhook.invalid/alerts".to_string());
    let alert_sink = Arc::new(DedupingAlertSink::new(
        WebhookAlertSink::new(webhook_url),
        Duration::from_secs(config.alerts.cooldown_s),
        config.alerts.score_bump_for_resend,
    ));

    let journal = match env::var("GEMFINDER_JOURNAL_PATH") {
        Ok(path) => Some(Arc::new(ScoreJournal::open(&path).context("opening score journal")?)),
        Err(_) => None,
    };

    let batch = Arc::new(BatchCoalescer::new(BatchConfig::default()));

    let scheduler = Arc::new(SchedulerLoop::new(
        discovery,
        filter,
        enrichment,
        scorer,
        alert_sink,
        journal,
        batch,
        SchedulerConfig::from_config(&config),
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel(1);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(()).await;
    });

    info!("gem-finder scheduler starting");
    scheduler.run(shutdown_rx).await;

    let summary = birdeye_cost_meter.session_summary();
    info!(
        total_cu = summary.total_cu,
        total_requests = summary.total_requests,
        batch_savings_cu = summary.batch_savings_cu,
        "gem-finder scheduler stopped"
    );

    Ok(())
}

/// Waits for either ctrl-c or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
