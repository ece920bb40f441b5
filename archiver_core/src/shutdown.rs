use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{ArchiveError, Result};

const RUNNING: u8 = 0;
const FINISHED: u8 = 1;
const CANCELLED: u8 = 2;
const FAILED: u8 = 3;

/// Why a [`Shutdown`] token left the running state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every block was written; stages should exit normally.
    Finished,
    /// The user asked to stop.
    Cancelled,
    /// A stage hit an error; see [`Shutdown::take_error`].
    Failed,
}

type Waker = Arc<dyn Fn() + Send + Sync>;

struct Inner {
    state: AtomicU8,
    error: Mutex<Option<ArchiveError>>,
    wakers: Mutex<Vec<Waker>>,
}

/// Cancellation context shared by every stage of one pipeline run.
///
/// The token moves from running to exactly one stop reason; the first caller
/// wins and later transitions are ignored. Stopping runs every registered
/// waker, which is how threads parked inside a queue or the orchestrator's
/// poll find out without waiting for the next block.
#[derive(Clone)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shutdown")
            .field("reason", &self.reason())
            .finish()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: AtomicU8::new(RUNNING),
                error: Mutex::new(None),
                wakers: Mutex::new(Vec::new()),
            }),
        }
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) != RUNNING
    }

    pub fn reason(&self) -> Option<StopReason> {
        match self.inner.state.load(Ordering::Acquire) {
            FINISHED => Some(StopReason::Finished),
            CANCELLED => Some(StopReason::Cancelled),
            FAILED => Some(StopReason::Failed),
            _ => None,
        }
    }

    /// Stop after a successful run. Returns `false` if already stopped.
    pub fn finish(&self) -> bool {
        self.stop(FINISHED)
    }

    /// Stop on user request. Returns `false` if already stopped.
    pub fn cancel(&self) -> bool {
        self.stop(CANCELLED)
    }

    /// Record `err` and stop. Only the first failure is kept and logged; any
    /// failure after that is a consequence of the shutdown and only shows up
    /// at debug level.
    pub fn fail(&self, err: ArchiveError) -> bool {
        if err.is_cancelled() {
            return self.cancel();
        }
        {
            let mut slot = self.inner.error.lock();
            if !self.transition(FAILED) {
                log::debug!("suppressed error after shutdown: {err}");
                return false;
            }
            log::error!("{err}");
            *slot = Some(err);
        }
        self.wake_all();
        true
    }

    /// Remove and return the recorded failure, if any.
    pub fn take_error(&self) -> Option<ArchiveError> {
        self.inner.error.lock().take()
    }

    /// Turn the stop reason into the run's result.
    pub fn outcome(&self) -> Result<()> {
        match self.reason() {
            None | Some(StopReason::Finished) => Ok(()),
            Some(StopReason::Cancelled) => Err(ArchiveError::Cancelled),
            Some(StopReason::Failed) => Err(self.take_error().unwrap_or(ArchiveError::Cancelled)),
        }
    }

    /// Register `waker` to run once when the token stops. If it already has,
    /// `waker` runs immediately on the calling thread.
    pub fn on_stop(&self, waker: impl Fn() + Send + Sync + 'static) {
        let waker: Waker = Arc::new(waker);
        self.inner.wakers.lock().push(Arc::clone(&waker));
        if self.is_stopped() {
            waker();
        }
    }

    fn stop(&self, state: u8) -> bool {
        if !self.transition(state) {
            return false;
        }
        self.wake_all();
        true
    }

    fn transition(&self, state: u8) -> bool {
        self.inner
            .state
            .compare_exchange(RUNNING, state, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn wake_all(&self) {
        let wakers: Vec<Waker> = self.inner.wakers.lock().clone();
        for waker in wakers {
            waker();
        }
    }
}
