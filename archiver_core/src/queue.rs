//! Bounded, order-enforcing block queue.
//!
//! One primitive does two jobs:
//!
//! * **Backpressure.** A producer stalls once admitting its block would push
//!   the queued content past `capacity` bytes.
//! * **Reordering barrier.** A block is only admitted when its id is the next
//!   expected one. Workers that finish out of order wait their turn inside
//!   [`BlockQueue::admit`], so the consumer always sees ids 0, 1, 2, ...
//!
//! Both conditions share one condition variable, so every state change wakes
//! all waiters and each re-checks its own precondition.
//!
//! A block larger than `capacity` could never satisfy the size check, and its
//! producer would hang forever. To rule that out, a block is admitted
//! regardless of its size whenever the queue is empty. The byte bound is
//! therefore exact for blocks up to `capacity` bytes and exceeded by at most
//! one oversized block otherwise.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::block::Block;
use crate::shutdown::Shutdown;

/// Returned by a queue operation when the run's [`Shutdown`] token stopped
/// while the caller was waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stopped;

impl fmt::Display for Stopped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("pipeline stopped")
    }
}

impl std::error::Error for Stopped {}

#[derive(Default)]
struct QueueState {
    blocks: VecDeque<Block>,
    expected_next_id: u64,
    bytes: usize,
}

impl QueueState {
    fn can_admit(&self, block: &Block, capacity: usize) -> bool {
        block.id() == self.expected_next_id
            && (self.blocks.is_empty() || self.bytes + block.len() <= capacity)
    }
}

pub struct BlockQueue {
    state: Mutex<QueueState>,
    changed: Condvar,
    capacity: usize,
    shutdown: Shutdown,
}

impl BlockQueue {
    /// Create a queue holding at most `capacity` content bytes, and hook it
    /// into `shutdown` so blocked callers wake up when the run stops.
    pub fn new(capacity: usize, shutdown: Shutdown) -> Arc<Self> {
        let queue = Arc::new(Self {
            state: Mutex::new(QueueState::default()),
            changed: Condvar::new(),
            capacity,
            shutdown: shutdown.clone(),
        });
        let weak = Arc::downgrade(&queue);
        shutdown.on_stop(move || {
            if let Some(queue) = weak.upgrade() {
                queue.wake_all();
            }
        });
        queue
    }

    /// Append `block` once it is next in line and fits.
    ///
    /// Blocks until `block.id()` equals the expected next id and the queue has
    /// room for it. Returns `Err(Stopped)` if the run stops first; the block
    /// is dropped in that case.
    pub fn admit(&self, block: Block) -> Result<(), Stopped> {
        let mut state = self.state.lock();
        loop {
            if self.shutdown.is_stopped() {
                return Err(Stopped);
            }
            if state.can_admit(&block, self.capacity) {
                break;
            }
            self.changed.wait(&mut state);
        }

        state.bytes += block.len();
        state.expected_next_id += 1;
        state.blocks.push_back(block);
        self.changed.notify_all();
        Ok(())
    }

    /// Remove and return the oldest block, waiting until one is available.
    ///
    /// The admission rule guarantees this is the smallest id still queued.
    pub fn take(&self) -> Result<Block, Stopped> {
        let mut state = self.state.lock();
        loop {
            if self.shutdown.is_stopped() {
                return Err(Stopped);
            }
            if let Some(block) = state.blocks.pop_front() {
                state.bytes -= block.len();
                self.changed.notify_all();
                return Ok(block);
            }
            self.changed.wait(&mut state);
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of blocks currently queued.
    pub fn len(&self) -> usize {
        self.state.lock().blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().blocks.is_empty()
    }

    /// Sum of content bytes currently queued.
    pub fn bytes(&self) -> usize {
        self.state.lock().bytes
    }

    /// Id the next admitted block must carry.
    pub fn expected_next_id(&self) -> u64 {
        self.state.lock().expected_next_id
    }

    fn wake_all(&self) {
        // Taking the lock orders this notify after any waiter that already
        // checked the token but has not parked yet.
        let _state = self.state.lock();
        self.changed.notify_all();
    }
}
