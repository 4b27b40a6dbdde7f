use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::types::ExtractError;
use crate::pool::PipelineStats;

/// Producer side of the line queue.
///
/// Lines travel as raw bytes: text decoding belongs to the workers, so a line
/// with invalid UTF-8 is a malformed record rather than a read failure.
///
/// [`run`](LineSource::run) consumes the source together with the only
/// sender of the line queue, so the queue closes exactly once when it returns.
pub struct LineSource<R> {
    path: PathBuf,
    reader: R,
}

impl LineSource<BufReader<File>> {
    /// Opens the input file. Failure here happens before any worker starts.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let path = path.as_ref().to_path_buf();
        match File::open(&path).await {
            Ok(file) => Ok(LineSource {
                path,
                reader: BufReader::new(file),
            }),
            Err(source) => Err(ExtractError::InputOpen { path, source }),
        }
    }
}

impl<R> LineSource<R>
where
    R: AsyncBufRead + Unpin,
{
    /// Wraps an already open reader; `path` is only used in error reports.
    pub fn from_reader(path: impl Into<PathBuf>, reader: R) -> Self {
        LineSource {
            path: path.into(),
            reader,
        }
    }

    /// Publishes every line into `lines`, waiting while the queue is full.
    /// The `\n` terminator and a trailing `\r` are stripped.
    ///
    /// Stops at end of input, on cancellation, or once no worker is left to
    /// receive. An I/O error is returned after the lines already queued.
    pub async fn run(
        self,
        lines: mpsc::Sender<Vec<u8>>,
        stats: Arc<PipelineStats>,
        cancel: CancellationToken,
    ) -> Result<(), ExtractError> {
        let LineSource { path, reader } = self;
        let mut reader = reader.split(b'\n');
        let mut lines_read = 0u64;

        loop {
            let next = tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!(lines_read, "line reader cancelled");
                    return Ok(());
                }

                next = reader.next_segment() => next,
            };

            let mut line = match next {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(source) => {
                    return Err(ExtractError::Read {
                        path,
                        lines_read,
                        source,
                    })
                }
            };
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines_read += 1;
            stats.record_read();

            let sent = tokio::select! {
                biased;

                _ = cancel.cancelled() => false,
                sent = lines.send(line) => sent.is_ok(),
            };
            if !sent {
                debug!(lines_read, "line queue closed before end of input");
                return Ok(());
            }
        }

        debug!(lines_read, "input exhausted");
        Ok(())
    }
}
