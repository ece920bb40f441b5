use std::io::{self, Read};

use crate::error::{ArchiveError, Result};

/// Size of the per-record header in bytes.
///   raw_size:i32 + compressed_size:i32 = 8
pub const BLOCK_HEADER_SIZE: usize = 8;

/// Default raw chunk size: 512 KB.
pub const DEFAULT_BLOCK_SIZE: usize = 512 * 1024;

/// Extension carried by the compressed side of a transform (without the dot).
pub const ARCHIVE_EXTENSION: &str = "gz";

// ── Record header ──────────────────────────────────────────────────────────

/// Decoded representation of the 8-byte header in front of every record.
///
/// An archive has no file header or footer; it is just a run of
/// `[raw_size:i32 LE][compressed_size:i32 LE][payload]` records in the
/// original chunk order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Length of the chunk once decompressed.
    pub raw_size: i32,
    /// Length of the codec payload that follows the header.
    pub compressed_size: i32,
}

impl BlockHeader {
    /// Build a header from in-memory lengths, rejecting anything that does
    /// not fit the signed 32-bit fields.
    pub fn new(raw_size: usize, compressed_size: usize) -> Result<Self> {
        let raw_size = i32::try_from(raw_size)
            .map_err(|_| ArchiveError::invalid(format!("raw block of {raw_size} bytes exceeds i32")))?;
        let compressed_size = i32::try_from(compressed_size).map_err(|_| {
            ArchiveError::invalid(format!("compressed block of {compressed_size} bytes exceeds i32"))
        })?;
        Ok(Self {
            raw_size,
            compressed_size,
        })
    }

    /// Serialize to exactly `BLOCK_HEADER_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; BLOCK_HEADER_SIZE] {
        let mut buf = [0u8; BLOCK_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.raw_size.to_le_bytes());
        buf[4..8].copy_from_slice(&self.compressed_size.to_le_bytes());
        buf
    }

    /// Deserialize from `BLOCK_HEADER_SIZE` bytes. No validation happens here;
    /// see [`BlockHeader::read_from`].
    pub fn from_bytes(buf: &[u8; BLOCK_HEADER_SIZE]) -> Self {
        let mut raw = [0u8; 4];
        let mut compressed = [0u8; 4];
        raw.copy_from_slice(&buf[0..4]);
        compressed.copy_from_slice(&buf[4..8]);
        Self {
            raw_size: i32::from_le_bytes(raw),
            compressed_size: i32::from_le_bytes(compressed),
        }
    }

    /// Read the next header from `src`.
    ///
    /// Returns `Ok(None)` on a clean end of stream (zero bytes left).
    /// Between one and seven remaining bytes, or negative sizes, are a
    /// corruption error. `offset` is only used for error messages.
    pub fn read_from<R: Read>(src: &mut R, offset: u64) -> Result<Option<Self>> {
        let mut buf = [0u8; BLOCK_HEADER_SIZE];
        let filled = read_full(src, &mut buf)
            .map_err(|e| ArchiveError::io(format!("reading block header at byte {offset}"), e))?;
        if filled == 0 {
            return Ok(None);
        }
        if filled < BLOCK_HEADER_SIZE {
            return Err(ArchiveError::corrupt(
                offset,
                format!("truncated block header: {filled} of {BLOCK_HEADER_SIZE} bytes"),
            ));
        }

        let header = Self::from_bytes(&buf);
        if header.raw_size < 0 || header.compressed_size < 0 {
            return Err(ArchiveError::corrupt(
                offset,
                format!(
                    "negative block size (raw {}, compressed {})",
                    header.raw_size, header.compressed_size
                ),
            ));
        }
        Ok(Some(header))
    }

    pub fn raw_len(&self) -> usize {
        self.raw_size as usize
    }

    pub fn compressed_len(&self) -> usize {
        self.compressed_size as usize
    }
}

/// Fill `buf` as far as the stream allows and return how many bytes landed.
/// Unlike `read_exact`, a short read is reported rather than turned into an
/// error, so callers can distinguish "nothing left" from "truncated".
pub(crate) fn read_full<R: Read>(src: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
