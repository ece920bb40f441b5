use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};

use crate::error::{ArchiveError, Result};
use crate::shutdown::Shutdown;

/// A running pipeline thread.
///
/// Whatever the body returns, errors and panics included, is settled at
/// the thread boundary: a failure stops `shutdown` and the thread exits.
/// Joining is bounded, since a stage stuck in file I/O must not hang the
/// orchestrator forever.
pub struct StageHandle {
    name: String,
    handle: JoinHandle<()>,
    // Never sent on; disconnects when the thread exits.
    exited: Receiver<()>,
}

/// Spawn `body` on a named thread wired to `shutdown`.
pub fn spawn_stage<F>(name: impl Into<String>, shutdown: Shutdown, body: F) -> Result<StageHandle>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    let name = name.into();
    let (exit_guard, exited) = bounded::<()>(1);
    let stage = name.clone();

    let handle = thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            let _exit_guard = exit_guard;
            match catch_unwind(AssertUnwindSafe(body)) {
                Ok(Ok(())) => log::debug!("{stage} exited"),
                Ok(Err(e)) => {
                    shutdown.fail(e);
                }
                Err(_) => {
                    shutdown.fail(ArchiveError::StagePanicked { stage });
                }
            }
        })
        .map_err(|e| ArchiveError::io(format!("spawning {name} thread"), e))?;

    Ok(StageHandle {
        name,
        handle,
        exited,
    })
}

impl StageHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait until `deadline` for the thread to exit. Returns `false` and
    /// leaves the thread detached if it is still running by then.
    pub fn join_until(self, deadline: Instant) -> bool {
        let timeout = deadline.saturating_duration_since(Instant::now());
        match self.exited.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("{} did not stop in time; leaving it detached", self.name);
                false
            }
            _ => {
                // The body never unwinds past catch_unwind, so join only
                // fails if the thread was torn down abnormally.
                if self.handle.join().is_err() {
                    log::warn!("{} terminated abnormally", self.name);
                }
                true
            }
        }
    }

    pub fn join_timeout(self, timeout: Duration) -> bool {
        self.join_until(Instant::now() + timeout)
    }
}
