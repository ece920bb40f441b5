mod gzip_codec;
mod lz4_codec;
mod passthrough;
mod zstd_codec;

pub use gzip_codec::GzipCodec;
pub use lz4_codec::Lz4Codec;
pub use passthrough::PassThroughCodec;
pub use zstd_codec::ZstdCodec;

use archiver_core::Codec;
use std::sync::Arc;

/// Names accepted by [`codec_by_name`], default first.
pub const CODEC_NAMES: &[&str] = &["gzip", "zstd", "lz4", "passthrough"];

/// Resolve a codec from its CLI name.
///
/// `level` overrides the codec's default compression level where the codec
/// has one. Archives carry no codec id, so decompression must name the same
/// codec the archive was written with.
pub fn codec_by_name(name: &str, level: Option<i32>) -> anyhow::Result<Arc<dyn Codec>> {
    match name {
        "gzip" | "gz" | "deflate" => Ok(Arc::new(match level {
            Some(level) => GzipCodec::new(level.clamp(0, 9) as u32),
            None => GzipCodec::default(),
        })),
        "zstd" | "z" => Ok(Arc::new(level.map_or_else(ZstdCodec::default, ZstdCodec::new))),
        "lz4" | "l" => Ok(Arc::new(Lz4Codec)),
        "passthrough" | "pass" | "none" => Ok(Arc::new(PassThroughCodec)),
        other => anyhow::bail!(
            "unknown codec '{}'. Valid options: {}",
            other,
            CODEC_NAMES.join(", ")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_name_resolves_and_round_trips() {
        let raw = b"round trip through every bundled codec ".repeat(100);
        for name in CODEC_NAMES {
            let codec = codec_by_name(name, None).unwrap();
            assert_eq!(codec.name(), *name);
            let compressed = codec.compress_block(&raw).unwrap();
            assert_eq!(codec.decompress_block(&compressed, raw.len()).unwrap(), raw, "{name}");
        }
    }

    #[test]
    fn unknown_name_lists_options() {
        let err = codec_by_name("brotli", None).err().unwrap().to_string();
        assert!(err.contains("gzip"), "{err}");
    }

    #[test]
    fn level_reaches_the_codec() {
        let fast = codec_by_name("gzip", Some(1)).unwrap();
        let small = codec_by_name("gzip", Some(9)).unwrap();
        let raw = b"abcabcabd".repeat(5000);
        let fast_len = fast.compress_block(&raw).unwrap().len();
        let small_len = small.compress_block(&raw).unwrap().len();
        assert!(small_len <= fast_len);
    }
}
