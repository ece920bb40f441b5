use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use env_logger::Env;

use archiver_codecs::codec_by_name;
use archiver_core::{
    ArchiveError, Mode, Pipeline, PipelineConfig, Progress, Shutdown, Summary, DEFAULT_BLOCK_SIZE,
};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "archiver",
    about = "Parallel block compressor: split a file into blocks and compress them on every core",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a file into a block archive (output must end in .gz)
    Compress(RunArgs),
    /// Decompress a block archive (input must end in .gz)
    Decompress(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Source file
    input: PathBuf,
    /// Destination file; must not exist yet
    output: PathBuf,
    /// Codec: gzip | zstd | lz4 | passthrough. Decompression must name the
    /// codec the archive was written with.
    #[arg(short, long, default_value = "gzip")]
    codec: String,
    /// Codec level (gzip 0–9, zstd 1–22); ignored by lz4 and passthrough
    #[arg(short, long)]
    level: Option<i32>,
    /// Worker threads (default: one per core, minus one on larger machines)
    #[arg(short, long)]
    workers: Option<usize>,
    /// Raw bytes per block when compressing (default: 512 KB)
    #[arg(short, long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: usize,
    /// Suppress the progress line and summary
    #[arg(short, long)]
    quiet: bool,
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

/// Redraws `\r<verb>... N% complete` whenever the percentage moves.
fn progress_printer(mode: Mode) -> impl FnMut(Progress) + Send + 'static {
    let mut last = None;
    move |progress: Progress| {
        let percent = progress.percent();
        if last == Some(percent) {
            return;
        }
        last = Some(percent);
        let mut err = io::stderr().lock();
        // Best effort; a closed stderr must not fail the run.
        let _ = write!(err, "\r{}... {:>3}% complete", capitalize(mode.verb()), percent);
        let _ = err.flush();
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn print_summary(summary: &Summary, codec: &str) {
    let secs = summary.elapsed.as_secs_f64();
    eprintln!();
    eprintln!("  codec       : {}", codec);
    eprintln!("  workers     : {}", summary.workers);
    eprintln!("  blocks      : {}", summary.blocks);
    eprintln!("  read        : {}", human_bytes(summary.bytes_in));
    eprintln!("  written     : {}", human_bytes(summary.bytes_out));
    eprintln!("  ratio       : {:.2}x", summary.ratio());
    eprintln!(
        "  throughput  : {}/s",
        human_bytes((summary.bytes_in as f64 / secs.max(1e-9)) as u64)
    );
    eprintln!("  elapsed     : {:.3}s", secs);
}

// ── Subcommand implementation ──────────────────────────────────────────────

fn run(mode: Mode, args: RunArgs) -> anyhow::Result<()> {
    let codec = codec_by_name(&args.codec, args.level)
        .map_err(|e| ArchiveError::invalid(e.to_string()))?;
    let codec_name = codec.name();

    let mut config =
        PipelineConfig::new(mode, args.input, args.output, codec).with_block_size(args.block_size);
    if let Some(workers) = args.workers {
        config = config.with_workers(workers);
    }

    let shutdown = Shutdown::new();
    let token = shutdown.clone();
    ctrlc::set_handler(move || {
        if token.cancel() {
            eprintln!("\nCancelling...");
        }
    })
    .context("installing Ctrl-C handler")?;

    let mut pipeline = Pipeline::new(config).with_shutdown(shutdown);
    if !args.quiet {
        pipeline = pipeline.on_progress(progress_printer(mode));
    }
    let summary = pipeline.run()?;

    if !args.quiet {
        print_summary(&summary, codec_name);
        eprintln!("Finished. Duration: {:.3}s", summary.elapsed.as_secs_f64());
    }
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Compress(args) => run(Mode::Compress, args),
        Commands::Decompress(args) => run(Mode::Decompress, args),
    };

    if let Err(err) = result {
        let code = match err.downcast_ref::<ArchiveError>() {
            Some(ArchiveError::Cancelled) => {
                eprintln!("Cancelled; partial output removed.");
                ArchiveError::Cancelled.exit_code()
            }
            Some(archive_err) => {
                eprintln!("\nerror: {err:#}");
                archive_err.exit_code()
            }
            None => {
                eprintln!("\nerror: {err:#}");
                1
            }
        };
        process::exit(code);
    }
}
