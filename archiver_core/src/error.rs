use std::io;

use thiserror::Error;

/// Every way a compress/decompress run can fail.
///
/// Variants line up with the exit codes reported by the CLI, so scripts can
/// tell a bad argument from a corrupted archive without parsing stderr.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("corrupted archive at byte {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    #[error("codec error in block {block}: {source}")]
    Codec {
        block: u64,
        #[source]
        source: anyhow::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("{stage} thread panicked")]
    StagePanicked { stage: String },
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

impl From<io::Error> for ArchiveError {
    fn from(source: io::Error) -> Self {
        Self::Io {
            context: "I/O error".to_string(),
            source,
        }
    }
}

impl ArchiveError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            offset,
            reason: reason.into(),
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Process exit code for this failure category.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidConfig(_) => 2,
            Self::Corrupt { .. } => 3,
            Self::Codec { .. } => 4,
            Self::Io { .. } => 5,
            Self::StagePanicked { .. } => 70,
            Self::Cancelled => 130,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_per_category() {
        let errors = [
            ArchiveError::invalid("x"),
            ArchiveError::corrupt(0, "x"),
            ArchiveError::Codec {
                block: 0,
                source: anyhow::anyhow!("x"),
            },
            ArchiveError::io("x", io::Error::other("x")),
            ArchiveError::Cancelled,
            ArchiveError::StagePanicked {
                stage: "x".into(),
            },
        ];
        let mut codes: Vec<i32> = errors.iter().map(ArchiveError::exit_code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert!(!codes.contains(&0));
    }

    #[test]
    fn io_context_is_part_of_the_message() {
        let err = ArchiveError::io("opening input.bin", io::Error::other("denied"));
        assert_eq!(err.to_string(), "opening input.bin: denied");
    }
}
