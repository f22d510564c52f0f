//! Job Registry: a concurrent map from job id to its lifecycle record,
//! keyed the same way a connection-health table might be keyed by URL.

use dashmap::DashMap;
use ethers::types::{Address, H256, U256, U64};
use serde::Serialize;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Sent,
    Mined,
    Failed,
}

#[derive(Debug, Clone)]
pub struct JobRecord {
    pub status: JobStatus,
    pub created_at: Instant,
    pub wallet_address: String,
    pub score: u64,
    pub nonce: Option<u64>,
    pub sent_at: Option<Instant>,
    pub tx_hash: Option<H256>,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
    pub receipt_status: Option<U64>,
    pub to: Option<Address>,
    pub from: Option<Address>,
    pub code: Option<String>,
    pub reason: Option<String>,
    pub unlock_all: bool,
}

impl JobRecord {
    pub fn queued(wallet_address: String, score: u64, unlock_all: bool) -> Self {
        Self {
            status: JobStatus::Queued,
            created_at: Instant::now(),
            wallet_address,
            score,
            nonce: None,
            sent_at: None,
            tx_hash: None,
            block_number: None,
            gas_used: None,
            receipt_status: None,
            to: None,
            from: None,
            code: None,
            reason: None,
            unlock_all,
        }
    }
}

pub struct JobRegistry {
    jobs: DashMap<Uuid, JobRecord>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self { jobs: DashMap::new() }
    }

    pub fn put(&self, id: Uuid, record: JobRecord) {
        self.jobs.insert(id, record);
    }

    pub fn get(&self, id: Uuid) -> Option<JobRecord> {
        self.jobs.get(&id).map(|r| r.clone())
    }

    /// Atomically mutate a job record in place. No-op if the job is unknown
    /// (e.g. already evicted).
    pub fn update(&self, id: Uuid, mutator: impl FnOnce(&mut JobRecord)) {
        if let Some(mut r) = self.jobs.get_mut(&id) {
            mutator(&mut r);
        }
    }

    /// Evict records older than `ttl`. Run every 60s by the janitor task,
    /// with a 15 minute TTL.
    pub fn evict(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let stale: Vec<Uuid> = self
            .jobs
            .iter()
            .filter(|e| now.duration_since(e.created_at) > ttl)
            .map(|e| *e.key())
            .collect();
        for id in &stale {
            self.jobs.remove(id);
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_mutates_in_place() {
        let reg = JobRegistry::new();
        let id = Uuid::new_v4();
        reg.put(id, JobRecord::queued("0xabc".into(), 10, false));

        reg.update(id, |r| {
            r.status = JobStatus::Sent;
            r.nonce = Some(7);
        });

        let rec = reg.get(id).unwrap();
        assert_eq!(rec.status, JobStatus::Sent);
        assert_eq!(rec.nonce, Some(7));
    }

    #[test]
    fn evict_drops_only_stale_records() {
        let reg = JobRegistry::new();
        let old = Uuid::new_v4();
        let fresh = Uuid::new_v4();

        let mut old_record = JobRecord::queued("0xabc".into(), 1, false);
        old_record.created_at = Instant::now() - Duration::from_secs(1000);
        reg.put(old, old_record);
        reg.put(fresh, JobRecord::queued("0xdef".into(), 1, false));

        let evicted = reg.evict(Duration::from_secs(900));
        assert_eq!(evicted, 1);
        assert!(reg.get(old).is_none());
        assert!(reg.get(fresh).is_some());
    }
}
