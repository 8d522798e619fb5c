//! ---
//! das_section: "03-messaging-middleware"
//! das_subsection: "module"
//! das_type: "source"
//! das_scope: "code"
//! das_description: "Messaging middleware port facade and transports."
//! das_version: "v0.1.0"
//! das_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use das_common::OverflowPolicy;
use parking_lot::{Condvar, Mutex};

/// Result of offering an item to a [`BoundedQueue`].
#[derive(Debug, PartialEq, Eq)]
pub enum EnqueueOutcome<T> {
    /// The item was enqueued.
    Accepted,
    /// The item was enqueued after evicting the returned oldest item
    /// (`DROP_OLDEST`).
    Displaced(T),
    /// The item was not enqueued; it is handed back to the caller.
    Rejected(T),
}

/// Bounded FIFO queue with a configurable overflow policy.
///
/// Producers call [`push`](Self::push); a consumer drains with
/// [`pop`](Self::pop). Under `BLOCK` a full queue makes `push` wait for
/// room, but never longer than the configured timeout. No policy allows
/// unbounded growth.
pub struct BoundedQueue<T> {
    state: Mutex<QueueState<T>>,
    space: Condvar,
    capacity: usize,
    policy: OverflowPolicy,
    block_timeout: Duration,
}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize, policy: OverflowPolicy, block_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.max(1).min(4096)),
                closed: false,
            }),
            space: Condvar::new(),
            capacity: capacity.max(1),
            policy,
            block_timeout,
        }
    }

    /// Offer an item under the configured overflow policy.
    pub fn push(&self, item: T) -> EnqueueOutcome<T> {
        let mut state = self.state.lock();
        if state.closed {
            return EnqueueOutcome::Rejected(item);
        }
        if state.items.len() < self.capacity {
            state.items.push_back(item);
            return EnqueueOutcome::Accepted;
        }
        match self.policy {
            OverflowPolicy::DropNewest => EnqueueOutcome::Rejected(item),
            OverflowPolicy::DropOldest => {
                let displaced = state.items.pop_front().expect("capacity is at least 1");
                state.items.push_back(item);
                EnqueueOutcome::Displaced(displaced)
            }
            OverflowPolicy::Block => {
                let deadline = Instant::now() + self.block_timeout;
                loop {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return EnqueueOutcome::Rejected(item);
                    }
                    let timed_out = self.space.wait_for(&mut state, remaining).timed_out();
                    if state.closed {
                        return EnqueueOutcome::Rejected(item);
                    }
                    if state.items.len() < self.capacity {
                        state.items.push_back(item);
                        return EnqueueOutcome::Accepted;
                    }
                    if timed_out {
                        return EnqueueOutcome::Rejected(item);
                    }
                }
            }
        }
    }

    /// Take the oldest item, if any. Never blocks.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        let item = state.items.pop_front();
        if item.is_some() {
            self.space.notify_one();
        }
        item
    }

    /// Whether the queue currently holds no items.
    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Close the queue, rejecting future pushes, and hand back whatever was
    /// still queued.
    pub fn close(&self) -> Vec<T> {
        let mut state = self.state.lock();
        state.closed = true;
        let drained = state.items.drain(..).collect();
        self.space.notify_all();
        drained
    }
}
