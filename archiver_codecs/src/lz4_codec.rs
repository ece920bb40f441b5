use archiver_core::codec::Codec;
use lz4_flex::{compress_prepend_size, decompress_size_prepended};

/// LZ4 block codec.
///
/// Fastest of the bundled codecs with the weakest ratio. Useful when the
/// pipeline is I/O bound and CPU time matters more than size.
pub struct Lz4Codec;

impl Codec for Lz4Codec {
    fn name(&self) -> &'static str {
        "lz4"
    }

    fn compress_block(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(compress_prepend_size(raw))
    }

    fn decompress_block(&self, compressed: &[u8], _raw_len: usize) -> anyhow::Result<Vec<u8>> {
        let raw = decompress_size_prepended(compressed)
            .map_err(|e| anyhow::anyhow!("lz4 decompress error: {}", e))?;
        Ok(raw)
    }
}
