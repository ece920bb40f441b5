//! Parallel block pipeline demo
//!
//! Generates a synthetic access-log corpus, compresses it with 1..=N worker
//! threads, decompresses every archive again and checks the round trip
//! byte for byte. Prints throughput and ratio per worker count so the
//! scaling of the worker pool is visible on the current machine.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use env_logger::Env;

use archiver_codecs::codec_by_name;
use archiver_core::{Mode, PipelineConfig, Summary, WorkerPool, DEFAULT_BLOCK_SIZE};

#[derive(Parser)]
#[command(name = "archiver-demo", about = "Benchmark the block pipeline across worker counts")]
struct DemoArgs {
    /// Size of the generated corpus in MB
    #[arg(long, default_value_t = 64)]
    size_mb: u64,
    /// Codec: gzip | zstd | lz4 | passthrough
    #[arg(short, long, default_value = "gzip")]
    codec: String,
    /// Highest worker count to try (default: the pool's default size)
    #[arg(short, long)]
    max_workers: Option<usize>,
}

// ── data generator ──────────────────────────────────────────────────────────

const HOSTS: &[&str] = &[
    "10.0.4.17", "10.0.4.18", "10.0.9.201", "172.16.3.5", "192.168.12.40", "10.2.0.77",
];
const LEVELS: &[&str] = &["INFO", "INFO", "INFO", "DEBUG", "WARN", "INFO", "ERROR", "INFO"];
const SERVICES: &[&str] = &["ingest", "billing", "auth", "search", "export", "scheduler"];
const MESSAGES: &[&str] = &[
    "request handled status=200 route=/v2/items/{id}",
    "cache miss key=item:{id} fallback=db",
    "token refreshed user={id} ttl=3600",
    "batch flushed rows={n} partition={p}",
    "slow query took={n}ms table=orders shard={p}",
    "retrying upstream call attempt={p} id={id}",
];

/// Deterministic log line for entry `i`; the same `i` always yields the
/// same bytes.
fn log_line(i: u64) -> String {
    let host = HOSTS[(i as usize * 7 + 3) % HOSTS.len()];
    let level = LEVELS[(i as usize * 3 + 1) % LEVELS.len()];
    let service = SERVICES[(i as usize * 5 + 2) % SERVICES.len()];
    let message = MESSAGES[(i as usize * 11 + 5) % MESSAGES.len()]
        .replace("{id}", &(i * 13 % 9_999_991).to_string())
        .replace("{n}", &((i * 137 + 42) % 5000).to_string())
        .replace("{p}", &(i % 16).to_string());

    let ts = 1_767_225_600u64 + i / 40;
    let (h, m, s) = ((ts / 3600) % 24, (ts / 60) % 60, ts % 60);
    let millis = (i * 37) % 1000;
    format!("2026-01-01T{h:02}:{m:02}:{s:02}.{millis:03}Z {level:<5} [{service}] {host} {message}\n")
}

fn write_corpus(path: &Path, target: u64) -> Result<(u64, u64)> {
    let mut out = BufWriter::new(
        File::create(path).with_context(|| format!("creating corpus {}", path.display()))?,
    );
    let (mut lines, mut total) = (0u64, 0u64);
    while total < target {
        let line = log_line(lines);
        out.write_all(line.as_bytes())?;
        total += line.len() as u64;
        lines += 1;
    }
    out.flush()?;
    Ok((lines, total))
}

// ── helpers ─────────────────────────────────────────────────────────────────

fn human_bytes(n: u64) -> String {
    const U: &[&str] = &["B", "KB", "MB", "GB"];
    let mut v = n as f64;
    let mut u = 0;
    while v >= 1024.0 && u < U.len() - 1 { v /= 1024.0; u += 1; }
    if u == 0 { format!("{n} B") } else { format!("{v:.2} {}", U[u]) }
}

fn throughput(bytes: u64, elapsed: Duration) -> String {
    format!("{}/s", human_bytes((bytes as f64 / elapsed.as_secs_f64().max(1e-9)) as u64))
}

fn section(title: &str) {
    println!("━━━ {title} {}", "━".repeat(70usize.saturating_sub(title.len() + 5)));
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
    }
}

/// Compare two files in 1 MB chunks.
fn same_contents(a: &Path, b: &Path) -> Result<bool> {
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(false);
    }
    let (mut fa, mut fb) = (File::open(a)?, File::open(b)?);
    let (mut ba, mut bb) = (vec![0u8; 1 << 20], vec![0u8; 1 << 20]);
    loop {
        let n = fa.read(&mut ba)?;
        if n == 0 {
            return Ok(true);
        }
        fb.read_exact(&mut bb[..n])?;
        if ba[..n] != bb[..n] {
            return Ok(false);
        }
    }
}

fn run_once(
    mode: Mode,
    input: &Path,
    output: &Path,
    codec: &str,
    workers: usize,
) -> Result<Summary> {
    let codec = codec_by_name(codec, None)?;
    let config = PipelineConfig::new(mode, input, output, codec)
        .with_block_size(DEFAULT_BLOCK_SIZE)
        .with_workers(workers);
    Ok(archiver_core::run(config)?)
}

// ── demo runner ─────────────────────────────────────────────────────────────

struct Row {
    workers: usize,
    compress: Summary,
    decompress: Summary,
}

fn run(args: DemoArgs) -> Result<()> {
    let max_workers = args.max_workers.unwrap_or_else(WorkerPool::default_size).max(1);
    let out_dir: PathBuf = std::env::temp_dir().join("archiver_demo");
    fs::create_dir_all(&out_dir)?;
    let corpus = out_dir.join("corpus.log");

    println!();
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║          archiver · parallel block compression demo             ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    section("0 · DATA GENERATION");
    let (lines, raw_bytes) = write_corpus(&corpus, args.size_mb * 1024 * 1024)?;
    println!("  {} log lines, {}", lines, human_bytes(raw_bytes));
    println!("  sample: {}", log_line(42).trim_end());
    println!();

    section("1 · COMPRESS / DECOMPRESS PER WORKER COUNT");
    println!("  codec {}, block size {}", args.codec, human_bytes(DEFAULT_BLOCK_SIZE as u64));
    println!();

    let mut rows = Vec::with_capacity(max_workers);
    for workers in 1..=max_workers {
        let archive = out_dir.join(format!("corpus.w{workers}.gz"));
        let restored = out_dir.join(format!("corpus.w{workers}.out"));
        remove_if_present(&archive)?;
        remove_if_present(&restored)?;

        eprint!("  {workers:>2} workers ... ");
        let compress = run_once(Mode::Compress, &corpus, &archive, &args.codec, workers)?;
        let decompress = run_once(Mode::Decompress, &archive, &restored, &args.codec, workers)?;
        if !same_contents(&corpus, &restored)? {
            bail!("round trip with {workers} workers produced different bytes");
        }
        eprintln!("verified");

        remove_if_present(&archive)?;
        remove_if_present(&restored)?;
        rows.push(Row { workers, compress, decompress });
    }

    println!();
    println!(
        "  {:>7}  {:>12}  {:>8}  {:>14}  {:>14}  {:>8}",
        "workers", "archive", "ratio", "compress", "decompress", "speedup"
    );
    println!("  {}", "─".repeat(72));
    let baseline = rows.first().map(|r| r.compress.elapsed);
    for row in &rows {
        let speedup = baseline
            .map(|b| b.as_secs_f64() / row.compress.elapsed.as_secs_f64().max(1e-9))
            .unwrap_or(1.0);
        println!(
            "  {:>7}  {:>12}  {:>7.2}x  {:>14}  {:>14}  {:>7.2}x",
            row.workers,
            human_bytes(row.compress.bytes_out),
            row.compress.ratio(),
            throughput(raw_bytes, row.compress.elapsed),
            throughput(raw_bytes, row.decompress.elapsed),
            speedup,
        );
    }
    println!();

    remove_if_present(&corpus)?;
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();
    if let Err(e) = run(DemoArgs::parse()) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
