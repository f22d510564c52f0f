//! Runtime configuration loaded entirely from the environment.
//!
//! Raw strings are read with `std::env::var(..).unwrap_or_else(..)`, then
//! parsed into the typed addresses and durations the rest of the service
//! actually uses.

use ethers::types::Address;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_url: String,
    pub private_key: String,
    pub contract_address: Address,
    pub port: u16,
    pub node_env: String,
    pub debug: bool,

    pub score_window_ms: u64,
    pub score_per_min_limit: u64,
    pub min_score_event: u64,
    pub max_score_event: u64,

    pub tx_confirmations: u64,
    pub tx_timeout_ms: u64,
    pub batch_interval_ms: u64,
    pub respond_after_ms: u64,
    pub request_hard_timeout_ms: u64,

    pub leaderboard_base: String,
    pub leaderboard_cache_ms: u64,
}

impl Config {
    /// Load from the environment, failing boot if a required variable is
    /// missing or malformed.
    pub fn load() -> eyre::Result<Self> {
        let rpc_url = require_env("RPC_URL")?;
        let private_key = require_env("PRIVATE_KEY")?;
        let contract_address: Address = require_env("CONTRACT_ADDRESS")?
            .parse()
            .map_err(|e| eyre::eyre!("CONTRACT_ADDRESS is not a valid address: {e}"))?;

        let batch_interval_ms = env_u64("BATCH_INTERVAL_MS", 5_000);
        let respond_after_ms = env_u64("RESPOND_AFTER_MS", 5_000);
        let request_hard_timeout_ms = std::env::var("REQUEST_HARD_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(batch_interval_ms + respond_after_ms + 5_000);

        Ok(Config {
            rpc_url,
            private_key,
            contract_address,
            port: env_u64("PORT", 3000) as u16,
            node_env: std::env::var("NODE_ENV").unwrap_or_else(|_| "production".into()),
            debug: env_bool("DEBUG", false),

            score_window_ms: env_u64("SCORE_WINDOW_MS", 60_000),
            score_per_min_limit: env_u64("SCORE_PER_MIN_LIMIT", 10_000),
            min_score_event: env_u64("MIN_SCORE_EVENT", 0),
            max_score_event: env_u64("MAX_SCORE_EVENT", 100),

            tx_confirmations: env_u64("TX_CONFIRMATIONS", 1),
            tx_timeout_ms: env_u64("TX_TIMEOUT_MS", 120_000),
            batch_interval_ms,
            respond_after_ms,
            request_hard_timeout_ms,

            leaderboard_base: std::env::var("LEADERBOARD_BASE")
                .unwrap_or_else(|_| "https://leaderboard.example.com".into()),
            leaderboard_cache_ms: env_u64("LEADERBOARD_CACHE_MS", 15_000),
        })
    }

    pub fn score_window(&self) -> Duration {
        Duration::from_millis(self.score_window_ms)
    }

    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }

    pub fn respond_after(&self) -> Duration {
        Duration::from_millis(self.respond_after_ms)
    }

    pub fn request_hard_timeout(&self) -> Duration {
        Duration::from_millis(self.request_hard_timeout_ms)
    }

    pub fn tx_timeout(&self) -> Duration {
        Duration::from_millis(self.tx_timeout_ms)
    }

    pub fn leaderboard_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.leaderboard_cache_ms)
    }

    /// Janitor period for the sliding-window ledger: `min(30s, W)`.
    pub fn ledger_janitor_interval(&self) -> Duration {
        std::cmp::min(Duration::from_secs(30), self.score_window())
    }
}

fn require_env(key: &str) -> eyre::Result<String> {
    std::env::var(key).map_err(|_| eyre::eyre!("{key} environment variable required"))
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}
