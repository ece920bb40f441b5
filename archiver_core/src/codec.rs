/// Core compression abstraction.
///
/// Each `Codec` implementation:
/// - Compresses every block standalone. No state may carry over from one
///   block to the next, because workers pick blocks up in arbitrary order.
/// - Must round-trip: `decompress_block(compress_block(x)?, x.len())` yields `x`.
///
/// The archive format stores no codec id, so both sides of a transform have
/// to be configured with the same codec.
pub trait Codec: Send + Sync {
    /// Human-readable codec name for CLI display.
    fn name(&self) -> &'static str;

    /// Compress a single independent block.
    fn compress_block(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>>;

    /// Decompress a single independent block.
    ///
    /// `raw_len` is the size recorded in the block header. Implementations may
    /// use it as a capacity hint; the pipeline rejects any output whose length
    /// differs from it.
    fn decompress_block(&self, compressed: &[u8], raw_len: usize) -> anyhow::Result<Vec<u8>>;
}
