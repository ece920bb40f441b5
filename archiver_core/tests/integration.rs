//! End-to-end tests: run the full reader → workers → writer pipeline against
//! real files and check the archive layout, round trips, failure cleanup and
//! cancellation.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use archiver_codecs::{GzipCodec, Lz4Codec, PassThroughCodec, ZstdCodec};
use archiver_core::{
    ArchiveError, BlockHeader, Codec, Mode, Pipeline, PipelineConfig, Shutdown,
    BLOCK_HEADER_SIZE, DEFAULT_BLOCK_SIZE,
};

/// Generate `len` deterministic bytes using a simple LCG.
fn pseudo_random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = seed;
    (0..len)
        .map(|_| {
            rng = rng
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (rng >> 56) as u8
        })
        .collect()
}

/// Generate `len` highly compressible bytes (repeating pattern).
fn compressible_bytes(len: usize) -> Vec<u8> {
    let pattern = b"the quick brown fox jumps over the lazy dog. ";
    (0..len).map(|i| pattern[i % pattern.len()]).collect()
}

// ── helpers ───────────────────────────────────────────────────────────────

struct Scratch {
    dir: tempfile::TempDir,
}

impl Scratch {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn file(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// Parse an archive into `(raw_size, compressed_size)` pairs.
fn records(archive: &Path) -> Vec<(i32, i32)> {
    let bytes = fs::read(archive).unwrap();
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let mut buf = [0u8; BLOCK_HEADER_SIZE];
        buf.copy_from_slice(&bytes[pos..pos + BLOCK_HEADER_SIZE]);
        let header = BlockHeader::from_bytes(&buf);
        out.push((header.raw_size, header.compressed_size));
        pos += BLOCK_HEADER_SIZE + header.compressed_len();
    }
    assert_eq!(pos, bytes.len(), "archive has trailing bytes");
    out
}

fn compress(
    input: &Path,
    output: &Path,
    codec: Arc<dyn Codec>,
    workers: usize,
) -> archiver_core::Result<archiver_core::Summary> {
    Pipeline::new(PipelineConfig::new(Mode::Compress, input, output, codec).with_workers(workers)).run()
}

fn decompress(
    input: &Path,
    output: &Path,
    codec: Arc<dyn Codec>,
    workers: usize,
) -> archiver_core::Result<archiver_core::Summary> {
    Pipeline::new(PipelineConfig::new(Mode::Decompress, input, output, codec).with_workers(workers))
        .run()
}

fn round_trip(data: &[u8], codec: Arc<dyn Codec>, workers: usize, block_size: usize) {
    let scratch = Scratch::new();
    let input = scratch.file("input.bin", data);
    let archive = scratch.path("input.bin.gz");
    let restored = scratch.path("restored.bin");

    let compressed = Pipeline::new(
        PipelineConfig::new(Mode::Compress, &input, &archive, Arc::clone(&codec))
            .with_workers(workers)
            .with_block_size(block_size),
    )
    .run()
    .unwrap();
    assert_eq!(compressed.blocks as usize, data.len().div_ceil(block_size));
    assert_eq!(compressed.bytes_out, fs::metadata(&archive).unwrap().len());

    let decompressed = decompress(&archive, &restored, codec, workers).unwrap();
    assert_eq!(decompressed.blocks, compressed.blocks);
    assert_eq!(fs::read(&restored).unwrap(), data, "round trip must be byte-exact");
}

// ── tests ──────────────────────────────────────────────────────────────────

#[test]
fn test_round_trip_across_worker_counts() {
    let data = compressible_bytes(3 * 64 * 1024 + 4321);
    for workers in [1, 2, 3, 8] {
        round_trip(&data, Arc::new(GzipCodec::default()), workers, 64 * 1024);
    }
}

#[test]
fn test_round_trip_every_codec() {
    let data = pseudo_random_bytes(200_000, 0xC0FFEE);
    round_trip(&data, Arc::new(GzipCodec::default()), 4, 32 * 1024);
    round_trip(&data, Arc::new(ZstdCodec::default()), 4, 32 * 1024);
    round_trip(&data, Arc::new(Lz4Codec), 4, 32 * 1024);
    round_trip(&data, Arc::new(PassThroughCodec), 4, 32 * 1024);
}

#[test]
fn test_many_small_blocks_stay_ordered() {
    // Tiny blocks and a tiny queue force constant reordering and backpressure.
    let data = pseudo_random_bytes(50_000, 7);
    let scratch = Scratch::new();
    let input = scratch.file("input.bin", &data);
    let archive = scratch.path("input.gz");
    let restored = scratch.path("restored.bin");

    let cfg = PipelineConfig::new(Mode::Compress, &input, &archive, Arc::new(GzipCodec::new(1)))
        .with_workers(6)
        .with_block_size(97)
        .with_queue_capacity(1024);
    let summary = Pipeline::new(cfg).run().unwrap();
    assert_eq!(summary.blocks as usize, data.len().div_ceil(97));

    let cfg = PipelineConfig::new(Mode::Decompress, &archive, &restored, Arc::new(GzipCodec::new(1)))
        .with_workers(6)
        .with_queue_capacity(1024);
    Pipeline::new(cfg).run().unwrap();
    assert_eq!(fs::read(&restored).unwrap(), data);
}

#[test]
fn test_two_mib_random_file_yields_four_records() {
    let data = pseudo_random_bytes(2 * 1024 * 1024, 0xDEAD_BEEF);
    let scratch = Scratch::new();
    let input = scratch.file("random.bin", &data);
    let archive = scratch.path("random.bin.gz");
    let restored = scratch.path("random.out");

    let summary = compress(&input, &archive, Arc::new(GzipCodec::default()), 4).unwrap();
    assert_eq!(summary.blocks, 4);

    let recs = records(&archive);
    assert_eq!(recs.len(), 4);
    for (raw_size, compressed_size) in recs {
        assert_eq!(raw_size as usize, DEFAULT_BLOCK_SIZE);
        // Incompressible input falls back to stored DEFLATE blocks: a few
        // bytes per block plus the gzip wrapper.
        let bound = DEFAULT_BLOCK_SIZE + DEFAULT_BLOCK_SIZE / 100 + 64;
        assert!(
            (compressed_size as usize) <= bound,
            "compressed_size {compressed_size} exceeds {bound}"
        );
    }

    decompress(&archive, &restored, Arc::new(GzipCodec::default()), 4).unwrap();
    assert_eq!(fs::read(&restored).unwrap(), data);
}

#[test]
fn test_ten_byte_file_is_one_record() {
    let scratch = Scratch::new();
    let input = scratch.file("tiny.txt", b"0123456789");
    let archive = scratch.path("tiny.txt.gz");

    let summary = compress(&input, &archive, Arc::new(GzipCodec::default()), 2).unwrap();
    assert_eq!(summary.blocks, 1);
    assert_eq!(summary.bytes_in, 10);

    let recs = records(&archive);
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].0, 10);
}

#[test]
fn test_compressible_data_shrinks() {
    let data = compressible_bytes(4 * DEFAULT_BLOCK_SIZE);
    let scratch = Scratch::new();
    let input = scratch.file("logs.txt", &data);
    let archive = scratch.path("logs.txt.gz");

    let summary = compress(&input, &archive, Arc::new(GzipCodec::default()), 3).unwrap();
    assert!(summary.bytes_out < summary.bytes_in / 10);
    assert!(summary.ratio() > 10.0);
    eprintln!("gzip ratio: {:.2}x", summary.ratio());
}

#[test]
fn test_truncated_last_record_is_corruption_and_leaves_no_output() {
    let data = pseudo_random_bytes(300_000, 99);
    let scratch = Scratch::new();
    let input = scratch.file("data.bin", &data);
    let archive = scratch.path("data.gz");
    compress(&input, &archive, Arc::new(GzipCodec::default()), 2).unwrap();

    // Chop the tail of the last payload off.
    let mut bytes = fs::read(&archive).unwrap();
    bytes.truncate(bytes.len() - 100);
    let broken = scratch.file("broken.gz", &bytes);
    let restored = scratch.path("restored.bin");

    let err = decompress(&broken, &restored, Arc::new(GzipCodec::default()), 2).unwrap_err();
    assert!(matches!(err, ArchiveError::Corrupt { .. }), "got {err:?}");
    assert_eq!(err.exit_code(), 3);
    assert!(!restored.exists(), "partial output must be removed");
}

#[test]
fn test_dangling_header_bytes_are_corruption() {
    let scratch = Scratch::new();
    let input = scratch.file("data.bin", b"some payload bytes");
    let archive = scratch.path("data.gz");
    compress(&input, &archive, Arc::new(GzipCodec::default()), 1).unwrap();

    let mut bytes = fs::read(&archive).unwrap();
    bytes.extend_from_slice(&[0, 1, 2]);
    let broken = scratch.file("broken.gz", &bytes);
    let restored = scratch.path("restored.bin");

    let err = decompress(&broken, &restored, Arc::new(GzipCodec::default()), 1).unwrap_err();
    assert!(matches!(err, ArchiveError::Corrupt { .. }), "got {err:?}");
    assert!(!restored.exists());
}

#[test]
fn test_garbage_payload_is_codec_error() {
    let mut bytes = BlockHeader::new(64, 16).unwrap().to_bytes().to_vec();
    bytes.extend_from_slice(&[0x55; 16]);
    let scratch = Scratch::new();
    let broken = scratch.file("garbage.gz", &bytes);
    let restored = scratch.path("restored.bin");

    let err = decompress(&broken, &restored, Arc::new(GzipCodec::default()), 2).unwrap_err();
    assert!(matches!(err, ArchiveError::Codec { block: 0, .. }), "got {err:?}");
    assert!(!restored.exists());
}

#[test]
fn test_existing_output_is_rejected_before_start() {
    let scratch = Scratch::new();
    let input = scratch.file("data.bin", b"payload");
    let archive = scratch.file("data.gz", b"precious existing content");

    let err = compress(&input, &archive, Arc::new(GzipCodec::default()), 2).unwrap_err();
    assert!(matches!(err, ArchiveError::InvalidConfig(_)), "got {err:?}");
    assert_eq!(fs::read(&archive).unwrap(), b"precious existing content");
}

/// Passthrough codec that counts calls and sleeps, so a run lasts long
/// enough to be cancelled halfway.
struct SlowCodec {
    calls: Arc<AtomicUsize>,
}

impl Codec for SlowCodec {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn compress_block(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        Ok(raw.to_vec())
    }

    fn decompress_block(&self, compressed: &[u8], _raw_len: usize) -> anyhow::Result<Vec<u8>> {
        Ok(compressed.to_vec())
    }
}

#[test]
fn test_cancel_mid_run_removes_output() {
    let scratch = Scratch::new();
    let input = scratch.file("big.bin", &compressible_bytes(400 * 1024));
    let archive = scratch.path("big.gz");
    let calls = Arc::new(AtomicUsize::new(0));

    let cfg = PipelineConfig::new(
        Mode::Compress,
        &input,
        &archive,
        Arc::new(SlowCodec {
            calls: Arc::clone(&calls),
        }),
    )
    .with_workers(2)
    .with_block_size(1024);

    let shutdown = Shutdown::new();
    let canceller = {
        let shutdown = shutdown.clone();
        let calls = Arc::clone(&calls);
        thread::spawn(move || {
            while calls.load(Ordering::SeqCst) < 5 {
                thread::sleep(Duration::from_millis(5));
            }
            shutdown.cancel();
        })
    };

    let err = Pipeline::new(cfg).with_shutdown(shutdown).run().unwrap_err();
    canceller.join().unwrap();
    assert!(err.is_cancelled(), "got {err:?}");
    assert!(!archive.exists(), "cancelled run must not leave output behind");
    assert!(calls.load(Ordering::SeqCst) < 400, "run should stop early");
}

#[test]
fn test_progress_reports_reach_completion() {
    let data = compressible_bytes(5 * 64 * 1024);
    let scratch = Scratch::new();
    let input = scratch.file("data.bin", &data);
    let archive = scratch.path("data.gz");

    let last = Arc::new(progress_probe::Last::default());
    let sink = Arc::clone(&last);
    Pipeline::new(
        PipelineConfig::new(Mode::Compress, &input, &archive, Arc::new(GzipCodec::default()))
            .with_block_size(64 * 1024)
            .with_workers(2),
    )
    .on_progress(move |p| sink.store(p.percent(), p.blocks_written))
    .run()
    .unwrap();

    let (percent, blocks_written) = last.load();
    assert_eq!(percent, 100);
    assert_eq!(blocks_written, 5);
}

mod progress_probe {
    use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

    /// Last progress value seen by a callback.
    #[derive(Default)]
    pub struct Last {
        percent: AtomicU8,
        blocks_written: AtomicU64,
    }

    impl Last {
        pub fn store(&self, percent: u8, blocks_written: u64) {
            self.percent.store(percent, Ordering::SeqCst);
            self.blocks_written.store(blocks_written, Ordering::SeqCst);
        }

        pub fn load(&self) -> (u8, u64) {
            (
                self.percent.load(Ordering::SeqCst),
                self.blocks_written.load(Ordering::SeqCst),
            )
        }
    }
}
