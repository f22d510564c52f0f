//! The Submission lifecycle object and the once-only reply guard.
//!
//! A reply channel owned by the Submission: whichever of the three race
//! participants (receipt waiter, early-ack timer, failsafe timer) gets
//! there first takes the `oneshot::Sender` out of a `parking_lot::Mutex`
//! and the other two become no-ops. Cancellation of the sibling timers
//! happens on *every* winning path, not just the receipt path - otherwise
//! a losing timer fires harmlessly later and wastes a tick.

use ethers::types::{Address, H256, U256};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::ledger::WindowInfo;

/// The tagged variant shapes that flow back to the HTTP layer.
#[derive(Debug, Clone)]
pub enum SubmitReply {
    Mined {
        tx_hash: H256,
        block_number: u64,
        status: u64,
        gas_used: U256,
        to: Address,
        from: Address,
        nonce: u64,
    },
    /// 202 after the tx hit the mempool but didn't mine within `ACK_AFTER`.
    /// Includes `nonce` and `ack_ms` - distinct from `QueuedFailsafe`.
    QueuedAck {
        job_id: Uuid,
        nonce: u64,
        ack_ms: u64,
    },
    /// 202 fired by the failsafe timer before the Dispatcher even picked the
    /// item up. No `nonce` yet exists for this item.
    QueuedFailsafe {
        job_id: Uuid,
        approx_batch_in_ms: u64,
    },
    ScoreHacking {
        reason: String,
        window: Option<WindowInfo>,
    },
    SendFailed {
        code: String,
        reason: String,
    },
    WaitTimeout {
        job_id: Uuid,
    },
}

struct ReplyState {
    sender: Option<oneshot::Sender<SubmitReply>>,
    failsafe: Option<AbortHandle>,
    ack: Option<AbortHandle>,
}

/// Shared, clonable handle to a Submission's once-only reply slot.
#[derive(Clone)]
pub struct ReplyHandle(Arc<Mutex<ReplyState>>);

impl ReplyHandle {
    pub fn new(sender: oneshot::Sender<SubmitReply>) -> Self {
        Self(Arc::new(Mutex::new(ReplyState {
            sender: Some(sender),
            failsafe: None,
            ack: None,
        })))
    }

    pub fn set_failsafe_handle(&self, handle: AbortHandle) {
        self.0.lock().failsafe = Some(handle);
    }

    pub fn set_ack_handle(&self, handle: AbortHandle) {
        self.0.lock().ack = Some(handle);
    }

    /// Attempt to deliver `reply`. Returns `true` if this call won the race.
    /// Cancels both sibling timers unconditionally on a win.
    pub fn try_reply(&self, reply: SubmitReply) -> bool {
        let mut state = self.0.lock();
        let Some(sender) = state.sender.take() else {
            return false;
        };
        if let Some(h) = state.failsafe.take() {
            h.abort();
        }
        if let Some(h) = state.ack.take() {
            h.abort();
        }
        let _ = sender.send(reply);
        true
    }

    pub fn already_replied(&self) -> bool {
        self.0.lock().sender.is_none()
    }
}

/// A client's submitted event, owned exclusively by Intake until enqueued,
/// then by the Dispatcher until terminal.
pub struct Submission {
    pub id: Uuid,
    pub wallet_address: String,
    pub addr_lower: String,
    pub score: u64,
    /// Privileged unlock submissions bypass window admission entirely.
    pub skip_window: bool,
    /// Whether this item currently holds a live ledger reservation.
    pub reservation_held: bool,
    pub accepted_at: Instant,
    pub reply: ReplyHandle,
}

impl Submission {
    pub fn new(
        id: Uuid,
        wallet_address: String,
        addr_lower: String,
        score: u64,
        skip_window: bool,
        reservation_held: bool,
        reply: ReplyHandle,
    ) -> Self {
        Self {
            id,
            wallet_address,
            addr_lower,
            score,
            skip_window,
            reservation_held,
            accepted_at: Instant::now(),
            reply,
        }
    }
}
