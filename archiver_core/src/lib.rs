pub mod block;
pub mod codec;
pub mod config;
pub mod error;
pub mod format;
pub mod pipeline;
pub mod progress;
pub mod queue;
pub mod reader;
pub mod shutdown;
pub mod stage;
pub mod worker;
pub mod writer;

pub use block::Block;
pub use codec::Codec;
pub use config::{Mode, PipelineConfig};
pub use error::{ArchiveError, Result};
pub use format::{BlockHeader, ARCHIVE_EXTENSION, BLOCK_HEADER_SIZE, DEFAULT_BLOCK_SIZE};
pub use pipeline::{run, Pipeline, Summary};
pub use progress::Progress;
pub use queue::BlockQueue;
pub use shutdown::{Shutdown, StopReason};
pub use worker::{Transform, WorkerPool};
