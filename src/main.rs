//! Entrypoint: load configuration, connect to the chain, wire up the
//! in-memory registries and the dispatcher, then serve HTTP.
//!
//! Boot sequence: dotenv, tracing subscriber, config, chain connect, spawn
//! background tasks, serve.

mod chain;
mod config;
mod dispatcher;
mod error;
mod http;
mod jobs;
mod leaderboard;
mod ledger;
mod pending;
mod stats;
mod submission;
mod unlock;

use std::sync::Arc;

use mimalloc::MiMalloc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::chain::ChainContext;
use crate::config::Config;
use crate::dispatcher::{spawn_job_janitor, spawn_ledger_janitor, Dispatcher};
use crate::jobs::JobRegistry;
use crate::leaderboard::LeaderboardAggregator;
use crate::ledger::SlidingWindowLedger;
use crate::pending::PendingQueue;
use crate::stats::DispatchStats;
use crate::unlock::WalletProbe;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .compact()
        .init();

    info!("chainscore-gate starting up");

    let config = Arc::new(Config::load()?);
    info!(
        "config loaded: port={} window={}ms/{} eventRange=[{},{}] batchInterval={}ms ackAfter={}ms hardTimeout={}ms",
        config.port,
        config.score_window_ms,
        config.score_per_min_limit,
        config.min_score_event,
        config.max_score_event,
        config.batch_interval_ms,
        config.respond_after_ms,
        config.request_hard_timeout_ms,
    );

    let chain = Arc::new(ChainContext::connect(&config).await?);
    info!("chain context ready: chainId={}", chain.chain_id);

    let ledger = Arc::new(SlidingWindowLedger::new(
        config.score_window(),
        config.score_per_min_limit,
    ));
    let jobs = Arc::new(JobRegistry::new());
    let pending = Arc::new(PendingQueue::new());
    let stats = Arc::new(DispatchStats::new());

    let http_client = reqwest::Client::builder()
        .user_agent("chainscore-gate/0.1")
        .build()?;
    let leaderboard = Arc::new(LeaderboardAggregator::new(
        http_client.clone(),
        config.leaderboard_base.clone(),
        config.leaderboard_cache_ttl(),
    ));
    let wallet_probe = Arc::new(WalletProbe::new(http_client, config.leaderboard_base.clone()));

    let dispatcher = Arc::new(Dispatcher::new(
        chain.clone(),
        ledger.clone(),
        jobs.clone(),
        pending.clone(),
        stats.clone(),
        config.clone(),
    ));
    dispatcher.clone().spawn_tick_loop();
    spawn_ledger_janitor(ledger.clone(), config.ledger_janitor_interval());
    spawn_job_janitor(jobs.clone());

    let state = http::AppState {
        config: config.clone(),
        chain,
        ledger,
        jobs,
        pending,
        stats,
        leaderboard,
        wallet_probe,
    };
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!("listening on 0.0.0.0:{}", config.port);
    axum::serve(listener, router).await?;

    Ok(())
}
