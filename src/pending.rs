//! The `pending` queue. Appended to by Intake, drained wholesale and
//! front-pushed by the Dispatcher. A single `parking_lot::Mutex` over a
//! `VecDeque` is enough: every critical section here is a plain in-memory
//! op, never held across an `.await`.

use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::submission::Submission;

pub struct PendingQueue {
    inner: Mutex<VecDeque<Submission>>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push_back(&self, submission: Submission) {
        self.inner.lock().push_back(submission);
    }

    /// Push items back onto the *front*, preserving their relative order.
    /// Used to requeue the remainder of a batch after a mid-batch send
    /// failure.
    pub fn push_front_all(&self, items: Vec<Submission>) {
        let mut guard = self.inner.lock();
        for item in items.into_iter().rev() {
            guard.push_front(item);
        }
    }

    /// Atomically remove everything currently queued.
    pub fn drain_all(&self) -> Vec<Submission> {
        let mut guard = self.inner.lock();
        guard.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for PendingQueue {
    fn default() -> Self {
        Self::new()
    }
}
