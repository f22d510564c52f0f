//! Batch Dispatcher: every `BATCH_INTERVAL`, drains `pending`, assigns
//! contiguous nonces to the surviving subsequence, serializes sends, and
//! waits receipts in parallel in the background.
//!
//! Running the whole tick body inside one un-interleaved loop iteration on
//! a single background task is what gives the "at most one tick at a time"
//! guarantee - there is no second task that could start a tick while one
//! is in flight.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ethers::types::Address;
use tracing::{error, info, warn};

use crate::chain::ChainContext;
use crate::config::Config;
use crate::jobs::{JobRegistry, JobStatus};
use crate::ledger::{ReserveOutcome, SlidingWindowLedger};
use crate::pending::PendingQueue;
use crate::stats::DispatchStats;
use crate::submission::{Submission, SubmitReply};

pub struct Dispatcher {
    chain: Arc<ChainContext>,
    ledger: Arc<SlidingWindowLedger>,
    jobs: Arc<JobRegistry>,
    pending: Arc<PendingQueue>,
    stats: Arc<DispatchStats>,
    config: Arc<Config>,
}

impl Dispatcher {
    pub fn new(
        chain: Arc<ChainContext>,
        ledger: Arc<SlidingWindowLedger>,
        jobs: Arc<JobRegistry>,
        pending: Arc<PendingQueue>,
        stats: Arc<DispatchStats>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            chain,
            ledger,
            jobs,
            pending,
            stats,
            config,
        }
    }

    /// Spawn the periodic tick loop.
    pub fn spawn_tick_loop(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.batch_interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.stats.record_tick();
                self.run_tick().await;
            }
        })
    }

    async fn run_tick(&self) {
        let batch = self.pending.drain_all();
        if batch.is_empty() {
            return;
        }
        info!("dispatcher tick: draining {} submission(s)", batch.len());

        let base_nonce = match self.chain.base_nonce().await {
            Ok(n) => n.as_u64(),
            Err(e) => {
                error!("base nonce fetch failed, failing whole batch: {e:?}");
                for item in batch {
                    self.fail_and_rollback(
                        item,
                        "NONCE_FETCH_FAILED",
                        &format!("{e:?}"),
                        SubmitReply::SendFailed {
                            code: "NONCE_FETCH_FAILED".into(),
                            reason: format!("{e:?}"),
                        },
                    );
                }
                return;
            }
        };

        let fee = self.chain.fee_data().await;

        let mut nonce_cursor = base_nonce;
        let mut requeue: Vec<Submission> = Vec::new();
        let mut aborted = false;

        for mut item in batch {
            if aborted {
                requeue.push(item);
                continue;
            }

            // Admission recheck: an item may have been requeued after a
            // prior tick's send failure, in which case its reservation was
            // already released and must be retaken here.
            if !item.skip_window && !item.reservation_held {
                match self.ledger.reserve(&item.addr_lower, item.score, item.id) {
                    ReserveOutcome::Denied(window) => {
                        self.jobs.update(item.id, |r| {
                            r.status = JobStatus::Failed;
                            r.code = Some("SUSPECTED_SCORE_HACKING".into());
                            r.reason = Some("window cap exceeded on re-admission".into());
                        });
                        item.reply.try_reply(SubmitReply::ScoreHacking {
                            reason: "window cap exceeded on re-admission".into(),
                            window: Some(window),
                        });
                        self.stats.record_failed();
                        // Nonce is not consumed; the next surviving item
                        // takes nonce_cursor unchanged.
                        continue;
                    }
                    ReserveOutcome::Ok => item.reservation_held = true,
                }
            }

            let nonce = nonce_cursor;
            let wallet: Address = match item.addr_lower.parse() {
                Ok(a) => a,
                Err(_) => {
                    // Unreachable in practice: Intake already validated the
                    // address syntax before it ever reaches the queue.
                    self.fail_and_rollback(
                        item,
                        "BAD_ADDRESS",
                        "wallet address failed to parse in dispatcher",
                        SubmitReply::SendFailed {
                            code: "BAD_ADDRESS".into(),
                            reason: "wallet address failed to parse".into(),
                        },
                    );
                    continue;
                }
            };

            // Step b: gas estimate.
            let gas_limit = self.chain.estimate_gas_limit(wallet, item.score, &fee).await;

            // Step c: record `sent` before the send call.
            self.jobs.update(item.id, |r| {
                r.status = JobStatus::Sent;
                r.sent_at = Some(Instant::now());
                r.nonce = Some(nonce);
            });

            // Step d: send (await the send ack, not the receipt).
            match self
                .chain
                .send_update(wallet, item.score, nonce, gas_limit, &fee)
                .await
            {
                Ok(tx_hash) => {
                    nonce_cursor += 1;
                    self.stats.record_sent();
                    info!(
                        "sent update for job {} at nonce {} (tx {:?})",
                        item.id, nonce, tx_hash
                    );

                    // Step e: arm the early-ack timer.
                    let ack_after = self.config.respond_after();
                    let ack_job_id = item.id;
                    let ack_reply = item.reply.clone();
                    let ack_task = tokio::spawn(async move {
                        tokio::time::sleep(ack_after).await;
                        ack_reply.try_reply(SubmitReply::QueuedAck {
                            job_id: ack_job_id,
                            nonce,
                            ack_ms: ack_after.as_millis() as u64,
                        });
                    });
                    item.reply.set_ack_handle(ack_task.abort_handle());

                    // Step f: spawn the background receipt waiter.
                    self.spawn_receipt_waiter(item, tx_hash, nonce);
                }
                Err(e) => {
                    warn!("send failed at nonce {nonce} for job {}: {e:?}", item.id);
                    self.stats.record_failed();
                    self.fail_and_rollback(
                        item,
                        "TX_SEND_ERROR",
                        &format!("{e:?}"),
                        SubmitReply::SendFailed {
                            code: "TX_SEND_ERROR".into(),
                            reason: format!("{e:?}"),
                        },
                    );
                    // Stop sending further items this tick: a gap at this
                    // nonce would stall the mempool.
                    aborted = true;
                }
            }
        }

        if !requeue.is_empty() {
            let n = requeue.len();
            for item in &mut requeue {
                if item.reservation_held {
                    self.ledger.rollback(&item.addr_lower, item.id);
                    item.reservation_held = false;
                }
                self.jobs.update(item.id, |r| {
                    r.status = JobStatus::Queued;
                    r.sent_at = None;
                    r.nonce = None;
                });
            }
            warn!("requeuing {n} submission(s) at the front after mid-batch send failure");
            self.pending.push_front_all(requeue);
        }
    }

    fn fail_and_rollback(
        &self,
        item: Submission,
        code: &str,
        reason: &str,
        reply: SubmitReply,
    ) {
        self.jobs.update(item.id, |r| {
            r.status = JobStatus::Failed;
            r.code = Some(code.to_string());
            r.reason = Some(reason.to_string());
        });
        if item.reservation_held && !item.skip_window {
            self.ledger.rollback(&item.addr_lower, item.id);
        }
        item.reply.try_reply(reply);
    }

    fn spawn_receipt_waiter(&self, item: Submission, tx_hash: ethers::types::H256, nonce: u64) {
        let chain = self.chain.clone();
        let jobs = self.jobs.clone();
        let ledger = self.ledger.clone();
        let stats = self.stats.clone();
        let confirmations = self.config.tx_confirmations;
        let tx_timeout = self.config.tx_timeout();

        tokio::spawn(async move {
            let result =
                tokio::time::timeout(tx_timeout, chain.wait_for_receipt(tx_hash, confirmations))
                    .await;

            match result {
                Ok(Ok(receipt)) => {
                    let block_number = receipt.block_number.map(|b| b.as_u64());
                    let status = receipt.status;
                    let gas_used = receipt.gas_used;
                    jobs.update(item.id, |r| {
                        r.status = JobStatus::Mined;
                        r.tx_hash = Some(tx_hash);
                        r.block_number = block_number;
                        r.gas_used = gas_used;
                        r.receipt_status = status;
                        r.to = Some(chain.contract_address);
                        r.from = Some(chain.signer_address);
                    });
                    stats.record_mined();
                    item.reply.try_reply(SubmitReply::Mined {
                        tx_hash,
                        block_number: block_number.unwrap_or_default(),
                        status: status.map(|s| s.as_u64()).unwrap_or_default(),
                        gas_used: gas_used.unwrap_or_default(),
                        to: chain.contract_address,
                        from: chain.signer_address,
                        nonce,
                    });
                    // Reservation is left in place until it expires out of
                    // the window naturally; only failure paths roll it back.
                }
                Ok(Err(e)) => {
                    warn!("post-send error waiting for job {}: {e:?}", item.id);
                    jobs.update(item.id, |r| {
                        r.status = JobStatus::Failed;
                        r.code = Some("TX_RECEIPT_ERROR".into());
                        r.reason = Some(format!("{e:?}"));
                    });
                    stats.record_failed();
                    item.reply.try_reply(SubmitReply::SendFailed {
                        code: "TX_RECEIPT_ERROR".into(),
                        reason: format!("{e:?}"),
                    });
                    if item.reservation_held && !item.skip_window {
                        ledger.rollback(&item.addr_lower, item.id);
                    }
                }
                Err(_elapsed) => {
                    warn!("receipt wait timed out for job {} (tx {:?})", item.id, tx_hash);
                    jobs.update(item.id, |r| {
                        r.status = JobStatus::Failed;
                        r.code = Some("TX_WAIT_TIMEOUT".into());
                        r.reason = Some("receipt not observed within TX_TIMEOUT_MS".into());
                    });
                    stats.record_failed();
                    item.reply.try_reply(SubmitReply::WaitTimeout { job_id: item.id });
                    if item.reservation_held && !item.skip_window {
                        ledger.rollback(&item.addr_lower, item.id);
                    }
                }
            }
        });
    }

    pub fn queue_depth(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> Arc<DispatchStats> {
        self.stats.clone()
    }
}

/// Janitor for the sliding-window ledger: purges expired entries every
/// `min(30s, W)`.
pub fn spawn_ledger_janitor(
    ledger: Arc<SlidingWindowLedger>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            ledger.purge_all();
        }
    })
}

/// Janitor for the job registry: evicts records older than 15 minutes,
/// running every 60s.
pub fn spawn_job_janitor(jobs: Arc<JobRegistry>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            let evicted = jobs.evict(Duration::from_secs(15 * 60));
            if evicted > 0 {
                info!("job registry janitor evicted {evicted} stale record(s)");
            }
        }
    })
}
