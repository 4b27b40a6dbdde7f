use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinError;

use crate::config::ConfigError;
use crate::pool::{PoolError, StatsSnapshot};

/// Errors that end an extraction run.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("invalid configuration")]
    Config(#[from] ConfigError),

    #[error("error opening input file {}", path.display())]
    InputOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error reading input file {} after {lines_read} lines", path.display())]
    Read {
        path: PathBuf,
        lines_read: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("error writing output file {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("worker pool failed")]
    Pool(#[from] PoolError),

    #[error("line reader task failed")]
    SourcePanicked(#[source] JoinError),

    #[error("shard writer task failed")]
    WriterPanicked(#[source] JoinError),

    #[error("extraction cancelled")]
    Cancelled,
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct ExtractionReport {
    pub stats: StatsSnapshot,
    /// Shard files in the order they were created
    pub shards: Vec<PathBuf>,
    pub rows_written: u64,
    pub elapsed: Duration,
}
