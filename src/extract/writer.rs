use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::debug;

use super::record::ProjectedRow;
use super::types::ExtractError;
use crate::config::OutputTemplate;

/// Paths and row count produced by one [`ShardWriter::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShardSummary {
    pub shards: Vec<PathBuf>,
    pub rows_written: u64,
}

/// Single consumer of the results queue, rotating CSV files every
/// `lines_per_file` rows.
pub struct ShardWriter {
    template: OutputTemplate,
    lines_per_file: usize,
}

struct ShardState {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows: usize,
}

impl ShardState {
    fn create(path: PathBuf) -> Result<Self, ExtractError> {
        let file = Self::create_file(&path).map_err(|e| ExtractError::Write {
            path: path.clone(),
            source: e.into(),
        })?;
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(file);
        debug!(path = %path.display(), "opened shard");
        Ok(ShardState {
            path,
            writer,
            rows: 0,
        })
    }

    fn create_file(path: &Path) -> std::io::Result<File> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        File::create(path)
    }

    fn write(&mut self, row: &ProjectedRow) -> Result<(), ExtractError> {
        self.writer
            .write_record(row.fields())
            .map_err(|source| ExtractError::Write {
                path: self.path.clone(),
                source,
            })?;
        self.rows += 1;
        Ok(())
    }

    /// Flushes buffered rows and closes the file.
    fn close(mut self) -> Result<(), ExtractError> {
        self.writer.flush().map_err(|e| ExtractError::Write {
            path: self.path.clone(),
            source: e.into(),
        })?;
        debug!(path = %self.path.display(), rows = self.rows, "closed shard");
        Ok(())
    }
}

impl ShardWriter {
    pub fn new(template: OutputTemplate, lines_per_file: usize) -> Self {
        ShardWriter {
            template,
            lines_per_file,
        }
    }

    /// Drains `rows` until the queue is closed and empty.
    ///
    /// Blocks the calling thread; run it on a blocking task. Shard indexes
    /// start at 0 and are never reused. The first create or write failure
    /// stops the writer and leaves the rest of the queue unread.
    pub fn run(self, mut rows: mpsc::Receiver<ProjectedRow>) -> Result<ShardSummary, ExtractError> {
        let mut summary = ShardSummary::default();
        let mut current: Option<ShardState> = None;

        while let Some(row) = rows.blocking_recv() {
            let mut shard = match current.take() {
                Some(shard) => shard,
                None => {
                    let path = self.template.path(summary.shards.len());
                    let shard = ShardState::create(path.clone())?;
                    summary.shards.push(path);
                    shard
                }
            };

            shard.write(&row)?;
            summary.rows_written += 1;

            if shard.rows < self.lines_per_file {
                current = Some(shard);
            } else {
                shard.close()?;
            }
        }

        if let Some(shard) = current {
            shard.close()?;
        }
        Ok(summary)
    }
}

#[cfg(test)]
#[path = "writer_test.rs"]
mod tests;
