use std::fmt;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sysinfo::System;

use crate::codec::Codec;
use crate::error::{ArchiveError, Result};
use crate::format::{ARCHIVE_EXTENSION, DEFAULT_BLOCK_SIZE};
use crate::reader::BlockSource;
use crate::worker::{Transform, WorkerPool};
use crate::writer::BlockSink;

/// Queue depth, in blocks per worker, before the memory cap kicks in.
pub const QUEUE_BLOCKS_PER_WORKER: usize = 50;

/// Direction of a run. Picks the reader, worker and writer variants once,
/// at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Compress,
    Decompress,
}

impl Mode {
    pub fn source<R: Read>(self, input: R, block_size: usize) -> BlockSource<R> {
        match self {
            Self::Compress => BlockSource::raw(input, block_size),
            Self::Decompress => BlockSource::encoded(input),
        }
    }

    pub fn transform(self) -> Transform {
        match self {
            Self::Compress => Transform::Compress,
            Self::Decompress => Transform::Decompress,
        }
    }

    pub fn sink<W: Write>(self, output: W) -> BlockSink<W> {
        match self {
            Self::Compress => BlockSink::Encoded(output),
            Self::Decompress => BlockSink::Raw(output),
        }
    }

    pub fn verb(self) -> &'static str {
        match self {
            Self::Compress => "compressing",
            Self::Decompress => "decompressing",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Compress => "compress",
            Self::Decompress => "decompress",
        })
    }
}

/// Everything one pipeline run needs.
#[derive(Clone)]
pub struct PipelineConfig {
    pub mode: Mode,
    pub input: PathBuf,
    pub output: PathBuf,
    /// Raw bytes per block on the compress path.
    pub block_size: usize,
    pub workers: usize,
    /// Byte capacity of each of the two queues. `None` sizes it from the
    /// worker count and available memory.
    pub queue_capacity: Option<usize>,
    pub codec: Arc<dyn Codec>,
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("mode", &self.mode)
            .field("input", &self.input)
            .field("output", &self.output)
            .field("block_size", &self.block_size)
            .field("workers", &self.workers)
            .field("queue_capacity", &self.queue_capacity)
            .field("codec", &self.codec.name())
            .finish()
    }
}

impl PipelineConfig {
    pub fn new(
        mode: Mode,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        codec: Arc<dyn Codec>,
    ) -> Self {
        Self {
            mode,
            input: input.into(),
            output: output.into(),
            block_size: DEFAULT_BLOCK_SIZE,
            workers: WorkerPool::default_size(),
            queue_capacity: None,
            codec,
        }
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_queue_capacity(mut self, bytes: usize) -> Self {
        self.queue_capacity = Some(bytes);
        self
    }

    /// Queue capacity in bytes, explicit or derived.
    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity
            .unwrap_or_else(|| default_queue_capacity(self.workers, self.block_size))
    }

    /// Check the run can start: arguments in range, input readable and
    /// non-empty, output absent in an existing directory, input and output
    /// distinct, and the compressed side carrying the archive extension.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 || self.block_size > i32::MAX as usize {
            return Err(ArchiveError::invalid(format!(
                "block size must be between 1 and {} bytes, got {}",
                i32::MAX,
                self.block_size
            )));
        }
        if self.workers == 0 {
            return Err(ArchiveError::invalid("at least one worker is required"));
        }
        if self.queue_capacity == Some(0) {
            return Err(ArchiveError::invalid("queue capacity must be positive"));
        }

        let input_meta = fs::metadata(&self.input).map_err(|_| {
            ArchiveError::invalid(format!("input file not found: {}", self.input.display()))
        })?;
        if !input_meta.is_file() {
            return Err(ArchiveError::invalid(format!(
                "input is not a regular file: {}",
                self.input.display()
            )));
        }
        if input_meta.len() == 0 {
            return Err(ArchiveError::invalid(format!(
                "input file is empty: {}",
                self.input.display()
            )));
        }

        let output_dir = match self.output.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !output_dir.is_dir() {
            return Err(ArchiveError::invalid(format!(
                "output directory does not exist: {}",
                output_dir.display()
            )));
        }
        if same_file(&self.input, &self.output, &output_dir) {
            return Err(ArchiveError::invalid("input and output paths must differ"));
        }
        if self.output.exists() {
            return Err(ArchiveError::invalid(format!(
                "output file already exists: {}",
                self.output.display()
            )));
        }

        let (side, path) = match self.mode {
            Mode::Compress => ("output", &self.output),
            Mode::Decompress => ("input", &self.input),
        };
        if !has_archive_extension(path) {
            return Err(ArchiveError::invalid(format!(
                "when {}, the {} file must have the '.{}' extension",
                self.mode.verb(),
                side,
                ARCHIVE_EXTENSION
            )));
        }
        Ok(())
    }
}

/// `min(available memory / 4, 50 * workers * block_size)`. Falls back to the
/// second term when the platform does not report available memory.
pub fn default_queue_capacity(workers: usize, block_size: usize) -> usize {
    let desired = QUEUE_BLOCKS_PER_WORKER
        .saturating_mul(workers.max(1))
        .saturating_mul(block_size);
    match available_memory() {
        Some(available) => {
            let quarter = usize::try_from(available / 4).unwrap_or(usize::MAX);
            desired.min(quarter)
        }
        None => desired,
    }
}

fn available_memory() -> Option<u64> {
    let mut sys = System::new();
    sys.refresh_memory();
    let available = sys.available_memory();
    (available > 0).then_some(available)
}

pub fn has_archive_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(ARCHIVE_EXTENSION))
}

fn same_file(input: &Path, output: &Path, output_dir: &Path) -> bool {
    let Ok(input) = input.canonicalize() else {
        return false;
    };
    let Some(name) = output.file_name() else {
        return false;
    };
    match output_dir.canonicalize() {
        Ok(dir) => dir.join(name) == input,
        Err(_) => false,
    }
}
