use std::sync::Arc;

use anyhow::anyhow;

use crate::block::Block;
use crate::codec::Codec;
use crate::error::{ArchiveError, Result};
use crate::queue::BlockQueue;
use crate::shutdown::Shutdown;
use crate::stage::{spawn_stage, StageHandle};

/// Per-block work done by every worker in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Raw bytes in, codec payload out.
    Compress,
    /// Codec payload in, exactly `raw_size` bytes out.
    Decompress,
}

impl Transform {
    /// Apply the codec to one block. The result keeps the input's id.
    pub fn transform(&self, codec: &dyn Codec, block: Block) -> Result<Block> {
        let id = block.id();
        match self {
            Self::Compress => {
                let compressed = codec
                    .compress_block(block.content())
                    .map_err(|source| ArchiveError::Codec { block: id, source })?;
                Ok(Block::compressed(id, compressed, block.raw_size()))
            }
            Self::Decompress => {
                let raw_size = block.raw_size();
                let raw = codec
                    .decompress_block(block.content(), raw_size)
                    .map_err(|source| ArchiveError::Codec { block: id, source })?;
                if raw.len() != raw_size {
                    return Err(ArchiveError::Codec {
                        block: id,
                        source: anyhow!(
                            "decompressed to {} bytes but header says {}",
                            raw.len(),
                            raw_size
                        ),
                    });
                }
                Ok(Block::raw(id, raw))
            }
        }
    }
}

/// Worker loop: take, transform, admit, until either queue reports the run
/// stopped. Completion order across workers is arbitrary; `output` puts the
/// results back in id order.
pub fn run_worker(
    transform: Transform,
    codec: &dyn Codec,
    input: &BlockQueue,
    output: &BlockQueue,
) -> Result<()> {
    while let Ok(block) = input.take() {
        let result = transform.transform(codec, block)?;
        if output.admit(result).is_err() {
            break;
        }
    }
    Ok(())
}

/// Fixed-size set of symmetric worker threads.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// One thread per core, minus one core for the reader and writer when
    /// more than two are available.
    pub fn default_size() -> usize {
        let cpus = num_cpus::get();
        let workers = if cpus > 2 { cpus - 1 } else { cpus };
        workers.max(1)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Spawn every worker. Threads already started are handed back through
    /// `handles` even when a later spawn fails.
    pub fn spawn(
        &self,
        transform: Transform,
        codec: &Arc<dyn Codec>,
        input: &Arc<BlockQueue>,
        output: &Arc<BlockQueue>,
        shutdown: &Shutdown,
        handles: &mut Vec<StageHandle>,
    ) -> Result<()> {
        for n in 0..self.workers {
            let codec = Arc::clone(codec);
            let input = Arc::clone(input);
            let output = Arc::clone(output);
            let handle = spawn_stage(format!("archiver-worker-{n}"), shutdown.clone(), move || {
                run_worker(transform, codec.as_ref(), &input, &output)
            })?;
            handles.push(handle);
        }
        log::debug!("started {} {:?} workers", self.workers, transform);
        Ok(())
    }
}
