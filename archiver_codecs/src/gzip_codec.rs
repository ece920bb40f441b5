use std::io::{Read, Write};

use anyhow::Context;
use archiver_core::codec::Codec;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

/// Cap on the output buffer reserved from the header's raw size, so a
/// corrupted header cannot force a huge allocation before decoding starts.
const MAX_PREALLOC: usize = 16 * 1024 * 1024;

/// Gzip (DEFLATE) block codec, the archive default.
///
/// Every block becomes a complete, standalone gzip member, so any block can
/// be decoded without its neighbours.
pub struct GzipCodec {
    /// Compression level (0 = store, 9 = smallest).
    pub level: u32,
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl GzipCodec {
    pub fn new(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

impl Codec for GzipCodec {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn compress_block(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::new(self.level));
        encoder.write_all(raw)?;
        Ok(encoder.finish()?)
    }

    fn decompress_block(&self, compressed: &[u8], raw_len: usize) -> anyhow::Result<Vec<u8>> {
        let mut raw = Vec::with_capacity(raw_len.min(MAX_PREALLOC));
        // Read one byte past the expected size so an oversized member is
        // caught instead of silently truncated.
        GzDecoder::new(compressed)
            .take(raw_len as u64 + 1)
            .read_to_end(&mut raw)
            .context("gzip decompress error")?;
        if raw.len() != raw_len {
            anyhow::bail!("gzip member holds {} bytes, expected {}", raw.len(), raw_len);
        }
        Ok(raw)
    }
}
