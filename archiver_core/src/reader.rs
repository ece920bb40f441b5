use std::io::Read;

use crate::block::Block;
use crate::error::{ArchiveError, Result};
use crate::format::{read_full, BlockHeader, BLOCK_HEADER_SIZE};
use crate::progress::PipelineCounters;
use crate::queue::BlockQueue;

/// Upper bound on the buffer reserved up front for a record payload. A
/// corrupted header may claim up to 2 GB; the buffer only grows as far as
/// the bytes actually present.
const MAX_PAYLOAD_PREALLOC: usize = 16 * 1024 * 1024;

/// Turns an input stream into numbered blocks.
///
/// * `Raw` chops plain bytes into `block_size` chunks (the last one may be
///   shorter). Used when compressing.
/// * `Encoded` parses `[header][payload]` records. Used when decompressing.
///
/// Ids start at 0 and increase by one per block, in stream order.
pub enum BlockSource<R> {
    Raw {
        input: R,
        block_size: usize,
        next_id: u64,
    },
    Encoded {
        input: R,
        next_id: u64,
        offset: u64,
    },
}

impl<R: Read> BlockSource<R> {
    pub fn raw(input: R, block_size: usize) -> Self {
        Self::Raw {
            input,
            block_size,
            next_id: 0,
        }
    }

    pub fn encoded(input: R) -> Self {
        Self::Encoded {
            input,
            next_id: 0,
            offset: 0,
        }
    }

    /// Read the next block. Returns the block together with the number of
    /// input bytes it consumed, or `None` once the stream is exhausted.
    pub fn produce(&mut self) -> Result<Option<(Block, u64)>> {
        match self {
            Self::Raw {
                input,
                block_size,
                next_id,
            } => {
                let mut buf = vec![0u8; *block_size];
                let n = read_full(input, &mut buf)
                    .map_err(|e| ArchiveError::io(format!("reading block {next_id}"), e))?;
                if n == 0 {
                    return Ok(None);
                }
                buf.truncate(n);
                let block = Block::raw(*next_id, buf);
                *next_id += 1;
                Ok(Some((block, n as u64)))
            }
            Self::Encoded {
                input,
                next_id,
                offset,
            } => {
                let Some(header) = BlockHeader::read_from(input, *offset)? else {
                    return Ok(None);
                };
                let payload_offset = *offset + BLOCK_HEADER_SIZE as u64;
                let want = header.compressed_len();

                let mut payload = Vec::with_capacity(want.min(MAX_PAYLOAD_PREALLOC));
                input
                    .by_ref()
                    .take(want as u64)
                    .read_to_end(&mut payload)
                    .map_err(|e| ArchiveError::io(format!("reading block {next_id} payload"), e))?;
                if payload.len() < want {
                    return Err(ArchiveError::corrupt(
                        payload_offset,
                        format!(
                            "block {} payload truncated: header claims {} bytes, {} present",
                            next_id,
                            want,
                            payload.len()
                        ),
                    ));
                }

                let block = Block::compressed(*next_id, payload, header.raw_len());
                let consumed = (BLOCK_HEADER_SIZE + want) as u64;
                *next_id += 1;
                *offset += consumed;
                Ok(Some((block, consumed)))
            }
        }
    }
}

/// Reader stage: pump every block of `source` into `queue`.
///
/// Marks the reader done only after the final block was admitted. If the
/// queue reports the run stopped, the stage exits quietly without marking
/// done; errors bubble up to the stage boundary.
pub fn run_reader<R: Read>(
    mut source: BlockSource<R>,
    queue: &BlockQueue,
    counters: &PipelineCounters,
) -> Result<()> {
    while let Some((block, consumed)) = source.produce()? {
        let id = block.id();
        if queue.admit(block).is_err() {
            log::debug!("reader stopped before admitting block {id}");
            return Ok(());
        }
        counters.record_read(consumed);
    }
    counters.mark_reader_done();
    log::debug!("reader finished after {} blocks", counters.blocks_read());
    Ok(())
}
