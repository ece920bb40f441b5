//! Orchestrator: reader → queue A → worker pool → queue B → writer.
//!
//! ```text
//!  input file ──► [reader] ──► inbound queue ──► [worker 0..N] ──► outbound queue ──► [writer] ──► output file
//!                  ids 0,1,2…   (ordered, bounded)   any order       (reorders, bounded)   ids 0,1,2…
//! ```
//!
//! The main thread only watches: it wakes on every written block (or once a
//! second), reports progress, and stops the run when the writer has caught up
//! with a finished reader. Any stage failure or a user cancel stops the shared
//! [`Shutdown`] token instead; every stage is then joined with a bounded wait
//! and the partial output file is removed.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{Mode, PipelineConfig};
use crate::error::{ArchiveError, Result};
use crate::format::BLOCK_HEADER_SIZE;
use crate::progress::{PipelineCounters, Progress};
use crate::queue::BlockQueue;
use crate::reader::run_reader;
use crate::shutdown::{Shutdown, StopReason};
use crate::stage::{spawn_stage, StageHandle};
use crate::worker::WorkerPool;
use crate::writer::run_writer;

/// Longest the orchestrator sleeps between completion checks.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Longest the orchestrator waits for stages to exit once the run stops.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub mode: Mode,
    pub blocks: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub workers: usize,
    pub elapsed: Duration,
}

impl Summary {
    /// Uncompressed size over compressed size, whichever direction ran.
    pub fn ratio(&self) -> f64 {
        let (raw, compressed) = match self.mode {
            Mode::Compress => (self.bytes_in, self.bytes_out),
            Mode::Decompress => (self.bytes_out, self.bytes_in),
        };
        if compressed == 0 {
            return 1.0;
        }
        raw as f64 / compressed as f64
    }
}

type ProgressFn = Box<dyn FnMut(Progress) + Send>;

/// One configured compress or decompress run.
pub struct Pipeline {
    config: PipelineConfig,
    shutdown: Shutdown,
    on_progress: Option<ProgressFn>,
}

#[derive(Default)]
struct Stages {
    writer: Option<StageHandle>,
    workers: Vec<StageHandle>,
    reader: Option<StageHandle>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            shutdown: Shutdown::new(),
            on_progress: None,
        }
    }

    /// Use an externally owned token, e.g. one a Ctrl-C handler cancels.
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Called on every poll while the run is live. Never called again once
    /// the run starts stopping.
    pub fn on_progress(mut self, callback: impl FnMut(Progress) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Validate, run every stage to completion and return the summary.
    ///
    /// On failure or cancellation the partial output file is deleted and the
    /// first recorded error is returned.
    pub fn run(mut self) -> Result<Summary> {
        self.config.validate()?;
        let started = Instant::now();
        let config = &self.config;

        let bytes_in = fs::metadata(&config.input)
            .map_err(|e| ArchiveError::io(format!("reading metadata of {}", config.input.display()), e))?
            .len();
        let input = File::open(&config.input)
            .map_err(|e| ArchiveError::io(format!("opening {}", config.input.display()), e))?;
        let output = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&config.output)
            .map_err(|e| ArchiveError::io(format!("creating {}", config.output.display()), e))?;

        let capacity = config.effective_queue_capacity();
        log::info!(
            "{} {} -> {} ({} bytes, {} workers, codec {}, queue capacity {} bytes)",
            config.mode.verb(),
            config.input.display(),
            config.output.display(),
            bytes_in,
            config.workers,
            config.codec.name(),
            capacity
        );

        let shutdown = self.shutdown.clone();
        let counters = PipelineCounters::new(bytes_in, &shutdown);
        let inbound = BlockQueue::new(capacity, shutdown.clone());
        let outbound = BlockQueue::new(capacity, shutdown.clone());

        let mut stages = Stages::default();
        if let Err(e) = spawn_stages(
            config,
            input,
            output,
            &shutdown,
            &counters,
            &inbound,
            &outbound,
            &mut stages,
        ) {
            shutdown.fail(e);
        }

        while !shutdown.is_stopped() {
            counters.wait_signal(POLL_INTERVAL);
            if shutdown.is_stopped() {
                break;
            }
            let progress = counters.snapshot();
            if let Some(callback) = self.on_progress.as_mut() {
                callback(progress);
            }
            if progress.is_complete() {
                shutdown.finish();
            }
        }

        let finished = shutdown.reason() == Some(StopReason::Finished);
        if !finished {
            log::info!("stopping {} and removing partial output", config.mode.verb());
        }
        stop_stages(stages);

        if !finished {
            remove_partial_output(&config.output);
            return Err(shutdown.outcome().err().unwrap_or(ArchiveError::Cancelled));
        }

        let summary = Summary {
            mode: config.mode,
            blocks: counters.blocks_written(),
            bytes_in,
            bytes_out: counters.bytes_written(),
            workers: config.workers,
            elapsed: started.elapsed(),
        };
        log::info!(
            "{} done: {} blocks, {} -> {} bytes in {:.3}s",
            config.mode.verb(),
            summary.blocks,
            summary.bytes_in,
            summary.bytes_out,
            summary.elapsed.as_secs_f64()
        );
        Ok(summary)
    }
}

/// Convenience wrapper for a run without progress reporting.
pub fn run(config: PipelineConfig) -> Result<Summary> {
    Pipeline::new(config).run()
}

#[allow(clippy::too_many_arguments)]
fn spawn_stages(
    config: &PipelineConfig,
    input: File,
    output: File,
    shutdown: &Shutdown,
    counters: &Arc<PipelineCounters>,
    inbound: &Arc<BlockQueue>,
    outbound: &Arc<BlockQueue>,
    stages: &mut Stages,
) -> Result<()> {
    let mode = config.mode;

    // Room for one whole record, so a block goes out in a single write.
    let sink = mode.sink(BufWriter::with_capacity(
        config.block_size + BLOCK_HEADER_SIZE,
        output,
    ));
    let queue = Arc::clone(outbound);
    let c = Arc::clone(counters);
    stages.writer = Some(spawn_stage("archiver-writer", shutdown.clone(), move || {
        run_writer(sink, &queue, &c)
    })?);

    WorkerPool::new(config.workers).spawn(
        mode.transform(),
        &config.codec,
        inbound,
        outbound,
        shutdown,
        &mut stages.workers,
    )?;

    let source = mode.source(BufReader::new(input), config.block_size);
    let queue = Arc::clone(inbound);
    let c = Arc::clone(counters);
    stages.reader = Some(spawn_stage("archiver-reader", shutdown.clone(), move || {
        run_reader(source, &queue, &c)
    })?);
    Ok(())
}

/// Join the writer first, then workers and reader, all against one deadline.
fn stop_stages(stages: Stages) {
    let deadline = Instant::now() + STOP_TIMEOUT;
    let handles = stages
        .writer
        .into_iter()
        .chain(stages.workers)
        .chain(stages.reader);
    let mut detached = 0;
    for handle in handles {
        if !handle.join_until(deadline) {
            detached += 1;
        }
    }
    if detached > 0 {
        log::warn!("{detached} pipeline threads still running after {STOP_TIMEOUT:?}");
    }
}

fn remove_partial_output(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => log::debug!("removed partial output {}", path.display()),
        Err(e) => log::warn!("could not remove partial output {}: {e}", path.display()),
    }
}
