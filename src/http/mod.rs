//! HTTP surface: router assembly and shared state, with `tower-http`'s
//! trace/timeout layers wrapped around a plain axum `Router`.

pub mod dto;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::chain::ChainContext;
use crate::config::Config;
use crate::jobs::JobRegistry;
use crate::leaderboard::LeaderboardAggregator;
use crate::ledger::SlidingWindowLedger;
use crate::pending::PendingQueue;
use crate::stats::DispatchStats;
use crate::unlock::WalletProbe;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub chain: Arc<ChainContext>,
    pub ledger: Arc<SlidingWindowLedger>,
    pub jobs: Arc<JobRegistry>,
    pub pending: Arc<PendingQueue>,
    pub stats: Arc<DispatchStats>,
    pub leaderboard: Arc<LeaderboardAggregator>,
    pub wallet_probe: Arc<WalletProbe>,
}

/// Build the router. The HTTP-level timeout is set generously above
/// `REQUEST_HARD_TIMEOUT_MS` - the failsafe timer inside `handlers::submit_score`
/// is what actually bounds a caller's wait; this layer only guards against a
/// handler hanging for reasons outside that contract.
pub fn build_router(state: AppState) -> Router {
    let hard_timeout = state.config.request_hard_timeout();
    let server_timeout = hard_timeout + Duration::from_secs(10);

    Router::new()
        .route("/api/v1/submitscore", post(handlers::submit_score))
        .route("/api/v1/s3cr3tUnlockAll", post(handlers::unlock_all))
        .route("/api/v1/jobs/{id}", get(handlers::job_status))
        .route("/api/v1/getleaderboard", get(handlers::leaderboard))
        .route("/health", get(handlers::health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(server_timeout)),
        )
        .with_state(state)
}
