use std::io::Write;

use crate::block::Block;
use crate::error::{ArchiveError, Result};
use crate::format::{BlockHeader, BLOCK_HEADER_SIZE};
use crate::progress::PipelineCounters;
use crate::queue::BlockQueue;

/// Appends ordered blocks to an output stream.
///
/// * `Encoded` writes `[header][payload]` records. Used when compressing.
/// * `Raw` writes payload bytes only. Used when decompressing.
pub enum BlockSink<W> {
    Raw(W),
    Encoded(W),
}

impl<W: Write> BlockSink<W> {
    /// Write one block and flush it. Returns the bytes written, header
    /// included.
    pub fn consume(&mut self, block: &Block) -> Result<u64> {
        let id = block.id();
        let written = match self {
            Self::Raw(out) => {
                out.write_all(block.content())
                    .map_err(|e| ArchiveError::io(format!("writing block {id}"), e))?;
                block.len()
            }
            Self::Encoded(out) => {
                let header = BlockHeader::new(block.raw_size(), block.len())?;
                out.write_all(&header.to_bytes())
                    .and_then(|()| out.write_all(block.content()))
                    .map_err(|e| ArchiveError::io(format!("writing block {id}"), e))?;
                BLOCK_HEADER_SIZE + block.len()
            }
        };
        self.get_mut()
            .flush()
            .map_err(|e| ArchiveError::io(format!("flushing block {id}"), e))?;
        Ok(written as u64)
    }

    pub fn get_mut(&mut self) -> &mut W {
        match self {
            Self::Raw(out) | Self::Encoded(out) => out,
        }
    }

    pub fn into_inner(self) -> W {
        match self {
            Self::Raw(out) | Self::Encoded(out) => out,
        }
    }
}

/// Writer stage: drain `queue` into `sink` until the run stops.
///
/// Each block is flushed before it is counted, so once the orchestrator sees
/// `blocks_written == blocks_read` every byte has reached the file.
pub fn run_writer<W: Write>(
    mut sink: BlockSink<W>,
    queue: &BlockQueue,
    counters: &PipelineCounters,
) -> Result<()> {
    while let Ok(block) = queue.take() {
        let written = sink.consume(&block)?;
        counters.record_written(written);
    }
    log::debug!("writer stopped after {} blocks", counters.blocks_written());
    Ok(())
}
