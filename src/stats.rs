//! Lightweight dispatcher counters for the health endpoint and log
//! summaries: atomics behind a single struct, snapshotted by value for
//! readers.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct DispatchStats {
    ticks: AtomicU64,
    sent: AtomicU64,
    mined: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatsSnapshot {
    pub ticks: u64,
    pub sent: u64,
    pub mined: u64,
    pub failed: u64,
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_mined(&self) {
        self.mined.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            mined: self.mined.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
