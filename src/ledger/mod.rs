//! Sliding-Window Ledger: per-wallet rolling sum of scores over `W` seconds
//! with an optimistic reserve/rollback discipline so in-flight submissions
//! consume quota until they succeed or are definitively rolled back. Uses
//! `DashMap`-backed per-key state rather than a single `Mutex<HashMap<..>>`,
//! since per-wallet locking is a fine-grained alternative to one global
//! lock.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Entry {
    ts: Instant,
    score: u64,
    job_id: Uuid,
}

#[derive(Debug, Default)]
struct WalletWindow {
    entries: VecDeque<Entry>,
    sum: u64,
}

/// Diagnostic fields returned alongside a `403 SUSPECTED_SCORE_HACKING` on
/// window-cap denial.
#[derive(Debug, Clone, Serialize)]
pub struct WindowInfo {
    pub used: u64,
    pub incoming: u64,
    pub limit: u64,
    pub seconds: u64,
}

pub enum ReserveOutcome {
    Ok,
    Denied(WindowInfo),
}

pub struct SlidingWindowLedger {
    windows: DashMap<String, WalletWindow>,
    window: Duration,
    limit: u64,
}

impl SlidingWindowLedger {
    pub fn new(window: Duration, limit: u64) -> Self {
        Self {
            windows: DashMap::new(),
            window,
            limit,
        }
    }

    /// Purge expired entries for a wallet, dropping the wallet's entry
    /// entirely once its window empties, to bound memory.
    fn purge_locked(&self, wallet_lower: &str, now: Instant) {
        let mut empty = false;
        if let Some(mut w) = self.windows.get_mut(wallet_lower) {
            while let Some(front) = w.entries.front() {
                if now.duration_since(front.ts) > self.window {
                    let gone = w.entries.pop_front().unwrap();
                    w.sum = w.sum.saturating_sub(gone.score);
                } else {
                    break;
                }
            }
            empty = w.entries.is_empty();
        }
        if empty {
            self.windows.remove(wallet_lower);
        }
    }

    /// Drop expired entries for a wallet. Called lazily on every access and
    /// by the janitor.
    pub fn purge(&self, wallet_lower: &str) {
        self.purge_locked(wallet_lower, Instant::now());
    }

    /// Sweep every wallet, purging expired entries. Run by the janitor task
    /// every `min(30s, W)`.
    pub fn purge_all(&self) {
        let wallets: Vec<String> = self.windows.iter().map(|e| e.key().clone()).collect();
        for wallet in wallets {
            self.purge(&wallet);
        }
    }

    /// Reserve `score` against a wallet's window. Appends `(now, score,
    /// job_id)` and bumps `sum` on success.
    pub fn reserve(&self, wallet_lower: &str, score: u64, job_id: Uuid) -> ReserveOutcome {
        let now = Instant::now();
        self.purge_locked(wallet_lower, now);

        let mut w = self.windows.entry(wallet_lower.to_string()).or_default();
        let projected = w.sum + score;
        if projected > self.limit {
            return ReserveOutcome::Denied(WindowInfo {
                used: w.sum,
                incoming: score,
                limit: self.limit,
                seconds: self.window.as_secs(),
            });
        }

        w.entries.push_back(Entry { ts: now, score, job_id });
        w.sum = projected;
        ReserveOutcome::Ok
    }

    /// Roll back a reservation, identified strictly by `job_id`. A
    /// same-score fallback match is deliberately not implemented: it is
    /// sloppy under concurrent same-score reservations, so this keys on
    /// `job_id` alone.
    pub fn rollback(&self, wallet_lower: &str, job_id: Uuid) {
        if let Some(mut w) = self.windows.get_mut(wallet_lower) {
            if let Some(pos) = w.entries.iter().rposition(|e| e.job_id == job_id) {
                let removed = w.entries.remove(pos).unwrap();
                w.sum = w.sum.saturating_sub(removed.score);
            }
        }
        self.purge(wallet_lower);
    }

    /// Current (used, limit, window_secs) for a wallet, after purging
    /// expired entries. Used by diagnostics and tests.
    pub fn snapshot(&self, wallet_lower: &str) -> (u64, u64, u64) {
        self.purge(wallet_lower);
        let used = self
            .windows
            .get(wallet_lower)
            .map(|w| w.sum)
            .unwrap_or(0);
        (used, self.limit, self.window.as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_accumulates_and_denies_over_limit() {
        let ledger = SlidingWindowLedger::new(Duration::from_secs(60), 100);
        let wallet = "0xabc";

        for _ in 0..10 {
            assert!(matches!(
                ledger.reserve(wallet, 10, Uuid::new_v4()),
                ReserveOutcome::Ok
            ));
        }

        match ledger.reserve(wallet, 1, Uuid::new_v4()) {
            ReserveOutcome::Denied(info) => {
                assert_eq!(info.used, 100);
                assert_eq!(info.limit, 100);
            }
            ReserveOutcome::Ok => panic!("expected denial at the cap"),
        }
    }

    #[test]
    fn rollback_releases_quota() {
        let ledger = SlidingWindowLedger::new(Duration::from_secs(60), 100);
        let wallet = "0xabc";
        let job_id = Uuid::new_v4();

        assert!(matches!(
            ledger.reserve(wallet, 100, job_id),
            ReserveOutcome::Ok
        ));
        assert!(matches!(
            ledger.reserve(wallet, 1, Uuid::new_v4()),
            ReserveOutcome::Denied(_)
        ));

        ledger.rollback(wallet, job_id);

        assert!(matches!(
            ledger.reserve(wallet, 1, Uuid::new_v4()),
            ReserveOutcome::Ok
        ));
    }

    #[test]
    fn purge_expires_old_entries_and_drops_empty_wallet() {
        let ledger = SlidingWindowLedger::new(Duration::from_millis(10), 100);
        let wallet = "0xabc";
        ledger.reserve(wallet, 50, Uuid::new_v4());
        std::thread::sleep(Duration::from_millis(20));
        ledger.purge(wallet);
        assert!(!ledger.windows.contains_key(wallet));
    }

    #[test]
    fn rollback_keys_strictly_on_job_id_not_score() {
        let ledger = SlidingWindowLedger::new(Duration::from_secs(60), 1000);
        let wallet = "0xabc";
        let job_a = Uuid::new_v4();
        let job_b = Uuid::new_v4();

        ledger.reserve(wallet, 50, job_a);
        ledger.reserve(wallet, 50, job_b);

        ledger.rollback(wallet, job_a);

        let (used, _, _) = ledger.snapshot(wallet);
        assert_eq!(used, 50, "only job_a's reservation should be released");
    }
}
