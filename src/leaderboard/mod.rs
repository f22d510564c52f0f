//! Leaderboard Aggregator: walks the upstream site's paginated,
//! server-streamed HTML, merges and de-dupes rows, and caches the merged
//! payload per `gameId` behind a TTL-keyed-by-id cache.

pub mod parse;

use std::collections::HashSet;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::{json, Value};
use tracing::warn;

/// Hard ceiling on pages walked per fetch, regardless of what the upstream
/// pagination metadata claims.
const MAX_PAGE_WALK: u64 = 50;

pub struct LeaderboardAggregator {
    http: reqwest::Client,
    base: String,
    ttl: Duration,
    cache: DashMap<u64, (Instant, Value)>,
}

impl LeaderboardAggregator {
    pub fn new(http: reqwest::Client, base: String, ttl: Duration) -> Self {
        Self {
            http,
            base,
            ttl,
            cache: DashMap::new(),
        }
    }

    /// Cache-aware aggregated payload for a game id.
    pub async fn get(&self, game_id: u64) -> eyre::Result<Value> {
        if let Some(entry) = self.cache.get(&game_id) {
            let age = entry.0.elapsed();
            if age < self.ttl {
                let mut payload = entry.1.clone();
                payload["cached"] = json!(true);
                payload["cacheMs"] = json!(age.as_millis() as u64);
                return Ok(payload);
            }
        }

        let payload = self.fetch_and_merge(game_id).await?;
        self.cache.insert(game_id, (Instant::now(), payload.clone()));
        Ok(payload)
    }

    /// Current score for a wallet within a game's leaderboard, used by the
    /// unlock path. Unknown wallets score `0`.
    pub async fn current_score(&self, game_id: u64, wallet_lower: &str) -> eyre::Result<u64> {
        let payload = self.get(game_id).await?;
        let score = payload["scoreData"]
            .as_array()
            .and_then(|rows| {
                rows.iter().find(|row| {
                    row["walletAddress"]
                        .as_str()
                        .map(|w| w.eq_ignore_ascii_case(wallet_lower))
                        .unwrap_or(false)
                })
            })
            .and_then(|row| row["score"].as_u64())
            .unwrap_or(0);
        Ok(score)
    }

    async fn fetch_and_merge(&self, game_id: u64) -> eyre::Result<Value> {
        let page1_html = self.fetch_page(game_id, 1).await?;
        let mut root = parse::extract_payload(&page1_html, game_id)
            .ok_or_else(|| eyre::eyre!("no leaderboard payload found for gameId {game_id} on page 1"))?;

        let score_pages = root["scorePagination"]["totalPages"].as_u64().unwrap_or(1);
        let tx_pages = root["transactionPagination"]["totalPages"].as_u64().unwrap_or(1);
        let total_pages = score_pages.max(tx_pages).min(MAX_PAGE_WALK);

        let mut score_rows = root["scoreData"].as_array().cloned().unwrap_or_default();
        let mut tx_rows = root["transactionData"].as_array().cloned().unwrap_or_default();
        let mut pages_walked = vec![1u64];

        for page in 2..=total_pages {
            let html = match self.fetch_page(game_id, page).await {
                Ok(h) => h,
                Err(e) => {
                    warn!("leaderboard page {page} fetch failed, keeping partial results: {e:?}");
                    break;
                }
            };
            let Some(payload) = parse::extract_payload(&html, game_id) else {
                warn!("leaderboard page {page} did not parse, keeping partial results");
                break;
            };
            let page_scores = payload["scoreData"].as_array().cloned().unwrap_or_default();
            let page_txs = payload["transactionData"].as_array().cloned().unwrap_or_default();
            if page_scores.is_empty() && page_txs.is_empty() {
                break;
            }
            score_rows.extend(page_scores);
            tx_rows.extend(page_txs);
            pages_walked.push(page);
        }

        dedupe_rows(&mut score_rows);
        dedupe_rows(&mut tx_rows);
        sort_by_rank(&mut score_rows);
        sort_by_rank(&mut tx_rows);

        root["scoreData"] = Value::Array(score_rows);
        root["transactionData"] = Value::Array(tx_rows);
        root["ok"] = json!(true);
        root["cached"] = json!(false);
        root["source"] = json!({
            "base": self.base,
            "pages": pages_walked,
            "fetchedAt": chrono::Utc::now().to_rfc3339(),
        });

        Ok(root)
    }

    async fn fetch_page(&self, game_id: u64, page: u64) -> eyre::Result<String> {
        let url = format!(
            "{}/leaderboard/{}?page={}",
            self.base.trim_end_matches('/'),
            game_id,
            page
        );
        let resp = self.http.get(&url).send().await?.error_for_status()?;
        Ok(resp.text().await?)
    }
}

/// De-duplicate by `(userId, walletAddress)`, keeping first occurrence.
fn dedupe_rows(rows: &mut Vec<Value>) {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    rows.retain(|row| {
        let user_id = row["userId"].to_string();
        let wallet = row["walletAddress"]
            .as_str()
            .map(|s| s.to_lowercase())
            .unwrap_or_default();
        seen.insert((user_id, wallet))
    });
}

fn sort_by_rank(rows: &mut [Value]) {
    rows.sort_by_key(|row| row["rank"].as_u64().unwrap_or(u64::MAX));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_rows_drops_repeat_user_wallet_pairs() {
        let mut rows = vec![
            json!({"userId": 1, "walletAddress": "0xAAA", "score": 10, "rank": 2}),
            json!({"userId": 1, "walletAddress": "0xaaa", "score": 10, "rank": 2}),
            json!({"userId": 2, "walletAddress": "0xbbb", "score": 5, "rank": 1}),
        ];
        dedupe_rows(&mut rows);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn sort_by_rank_orders_ascending() {
        let mut rows = vec![
            json!({"rank": 3}),
            json!({"rank": 1}),
            json!({"rank": 2}),
        ];
        sort_by_rank(&mut rows);
        let ranks: Vec<u64> = rows.iter().map(|r| r["rank"].as_u64().unwrap()).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }
}
