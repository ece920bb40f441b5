use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::shutdown::Shutdown;

/// Point-in-time view of a run, handed to progress callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    /// Input bytes consumed by the reader.
    pub bytes_done: u64,
    /// Size of the input file.
    pub bytes_total: u64,
    pub blocks_read: u64,
    pub blocks_written: u64,
    /// The reader consumed the whole input.
    pub reader_done: bool,
}

impl Progress {
    /// Completion in whole percent, clamped to 0..=100.
    pub fn percent(&self) -> u8 {
        if self.bytes_total == 0 {
            return 100;
        }
        ((self.bytes_done.min(self.bytes_total) * 100) / self.bytes_total) as u8
    }

    /// True once the reader finished and the writer caught up with it.
    pub fn is_complete(&self) -> bool {
        self.reader_done && self.blocks_written == self.blocks_read
    }
}

/// Counters shared between the reader, the writer and the orchestrator.
///
/// The writer bumps `blocks_written` and then raises the "block written"
/// signal; the orchestrator sleeps on that signal (bounded) and compares the
/// counters to decide whether the run is complete.
pub struct PipelineCounters {
    bytes_total: AtomicU64,
    bytes_read: AtomicU64,
    blocks_read: AtomicU64,
    reader_done: AtomicBool,
    blocks_written: AtomicU64,
    bytes_written: AtomicU64,
    signaled: Mutex<bool>,
    signal: Condvar,
}

impl PipelineCounters {
    pub fn new(bytes_total: u64, shutdown: &Shutdown) -> Arc<Self> {
        let counters = Arc::new(Self {
            bytes_total: AtomicU64::new(bytes_total),
            bytes_read: AtomicU64::new(0),
            blocks_read: AtomicU64::new(0),
            reader_done: AtomicBool::new(false),
            blocks_written: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            signaled: Mutex::new(false),
            signal: Condvar::new(),
        });
        let weak = Arc::downgrade(&counters);
        shutdown.on_stop(move || {
            if let Some(counters) = weak.upgrade() {
                counters.notify();
            }
        });
        counters
    }

    pub fn record_read(&self, input_bytes: u64) {
        self.bytes_read.fetch_add(input_bytes, Ordering::AcqRel);
        self.blocks_read.fetch_add(1, Ordering::AcqRel);
    }

    /// Mark the whole input as consumed. Only called after the last block
    /// was admitted, so "done" can be told apart from "temporarily empty".
    pub fn mark_reader_done(&self) {
        self.reader_done.store(true, Ordering::Release);
        self.notify();
    }

    pub fn record_written(&self, output_bytes: u64) {
        self.bytes_written.fetch_add(output_bytes, Ordering::AcqRel);
        self.blocks_written.fetch_add(1, Ordering::AcqRel);
        self.notify();
    }

    pub fn reader_done(&self) -> bool {
        self.reader_done.load(Ordering::Acquire)
    }

    pub fn blocks_read(&self) -> u64 {
        self.blocks_read.load(Ordering::Acquire)
    }

    pub fn blocks_written(&self) -> u64 {
        self.blocks_written.load(Ordering::Acquire)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Acquire)
    }

    /// Consistent enough to decide completion: `reader_done` is loaded
    /// first, so when it is set `blocks_read` is already final.
    pub fn snapshot(&self) -> Progress {
        let reader_done = self.reader_done();
        Progress {
            bytes_done: self.bytes_read.load(Ordering::Acquire),
            bytes_total: self.bytes_total.load(Ordering::Acquire),
            blocks_read: self.blocks_read(),
            blocks_written: self.blocks_written(),
            reader_done,
        }
    }

    /// Wait up to `timeout` for the signal, then clear it. Returns whether
    /// the signal was raised.
    pub fn wait_signal(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut signaled = self.signaled.lock();
        while !*signaled {
            if self.signal.wait_until(&mut signaled, deadline).timed_out() {
                break;
            }
        }
        std::mem::replace(&mut *signaled, false)
    }

    fn notify(&self) {
        *self.signaled.lock() = true;
        self.signal.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn percent_is_clamped() {
        let p = Progress {
            bytes_done: 50,
            bytes_total: 200,
            ..Default::default()
        };
        assert_eq!(p.percent(), 25);
        let p = Progress {
            bytes_done: 300,
            bytes_total: 200,
            ..Default::default()
        };
        assert_eq!(p.percent(), 100);
        assert_eq!(Progress::default().percent(), 100);
    }

    #[test]
    fn completion_needs_reader_done_and_equal_counts() {
        let counters = PipelineCounters::new(10, &Shutdown::new());
        counters.record_read(10);
        assert!(!counters.snapshot().is_complete());
        counters.mark_reader_done();
        assert!(!counters.snapshot().is_complete());
        counters.record_written(4);
        let progress = counters.snapshot();
        assert!(progress.is_complete());
        assert_eq!(progress.percent(), 100);
        assert_eq!(counters.bytes_written(), 4);
    }

    #[test]
    fn wait_signal_times_out_without_writes() {
        let counters = PipelineCounters::new(0, &Shutdown::new());
        let start = Instant::now();
        assert!(!counters.wait_signal(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn signal_is_consumed_by_one_wait() {
        let counters = PipelineCounters::new(0, &Shutdown::new());
        counters.record_written(1);
        assert!(counters.wait_signal(Duration::from_millis(1)));
        assert!(!counters.wait_signal(Duration::from_millis(1)));
    }

    #[test]
    fn stop_wakes_the_waiter() {
        let shutdown = Shutdown::new();
        let counters = PipelineCounters::new(0, &shutdown);
        let c = Arc::clone(&counters);
        let waiter = thread::spawn(move || c.wait_signal(Duration::from_secs(30)));
        thread::sleep(Duration::from_millis(20));
        shutdown.cancel();
        assert!(waiter.join().unwrap());
    }
}
