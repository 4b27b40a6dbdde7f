use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::record::{ProjectedRow, RecordCodec};
use super::source::LineSource;
use super::types::{ExtractError, ExtractionReport};
use super::writer::ShardWriter;
use crate::config::{ConfigError, OutputTemplate, PipelineConfig};
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::pool::{LineDecoder, PipelineStats, WorkerPool};

/// Runs one JSONL → CSV extraction: line reader, worker pool, shard writer.
///
/// # Lifecycle
///
/// 1. Open the input (fatal if it cannot be opened)
/// 2. Start the line reader and `num_workers` workers
/// 3. Drain the results queue into shard files on a blocking thread
/// 4. Join everything and report the line counts
pub struct ExtractionManager<D = RecordCodec> {
    config: PipelineConfig,
    template: OutputTemplate,
    decoder: Arc<D>,
    metrics: Arc<dyn MetricsSink>,
}

impl ExtractionManager<RecordCodec> {
    /// Creates a manager for the `{spins, server_time}` record schema.
    ///
    /// Rejects a configuration the pipeline cannot run with; the worker
    /// ceiling is left to [`PipelineConfig::validate`].
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.check()?;
        let template = config.output_template()?;
        Ok(ExtractionManager {
            config,
            template,
            decoder: Arc::new(RecordCodec),
            metrics: Arc::new(NoopMetrics),
        })
    }
}

impl<D> ExtractionManager<D>
where
    D: LineDecoder<Output = ProjectedRow> + 'static,
{
    /// Replaces the line decoder.
    pub fn with_decoder<E>(self, decoder: E) -> ExtractionManager<E>
    where
        E: LineDecoder<Output = ProjectedRow> + 'static,
    {
        ExtractionManager {
            config: self.config,
            template: self.template,
            decoder: Arc::new(decoder),
            metrics: self.metrics,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the pipeline to completion.
    ///
    /// Resolves only after the writer has drained the results queue and every
    /// worker and the line reader have been joined. Cancelling `cancel` closes
    /// both queues the same way end of input does and yields
    /// [`ExtractError::Cancelled`].
    pub async fn run(&self, cancel: &CancellationToken) -> Result<ExtractionReport, ExtractError> {
        let started = Instant::now();
        info!(
            input = %self.config.input_file_name().display(),
            output = self.config.output_file_name(),
            workers = self.config.num_workers(),
            lines_per_file = self.config.lines_per_file(),
            "pipeline started"
        );

        let source = LineSource::open(self.config.input_file_name())
            .await
            .inspect_err(|e| {
                self.metrics.record_error("read");
                error!(error = %e, "error opening input file");
            })?;

        let (line_tx, line_rx) = mpsc::channel(self.config.lines_channel_size());
        let (row_tx, row_rx) = mpsc::channel(self.config.results_channel_size());
        self.metrics
            .set_channel_capacity("lines", self.config.lines_channel_size());
        self.metrics
            .set_channel_capacity("results", self.config.results_channel_size());

        let stats = Arc::new(PipelineStats::new());
        // Also cancelled on a write failure so the reader and workers stop early.
        let shutdown = cancel.child_token();

        let source_handle = tokio::spawn(source.run(line_tx, Arc::clone(&stats), shutdown.clone()));
        let pool = WorkerPool::new(self.config.num_workers()).spawn(
            line_rx,
            row_tx,
            Arc::clone(&self.decoder),
            Arc::clone(&stats),
            Arc::clone(&self.metrics),
            &shutdown,
        );

        let writer = ShardWriter::new(self.template.clone(), self.config.lines_per_file());
        let write_result = match tokio::task::spawn_blocking(move || writer.run(row_rx)).await {
            Ok(result) => result,
            Err(e) => Err(ExtractError::WriterPanicked(e)),
        };
        if write_result.is_err() {
            shutdown.cancel();
        }

        let pool_result = pool.join().await;
        let source_result = match source_handle.await {
            Ok(result) => result,
            Err(e) => Err(ExtractError::SourcePanicked(e)),
        };
        self.metrics.observe_duration("extract", started.elapsed());

        let summary = write_result.inspect_err(|e| {
            self.metrics.record_error("write");
            error!(error = %e, "error writing output file");
        })?;
        pool_result.inspect_err(|e| error!(error = %e, "worker pool failed"))?;
        source_result.inspect_err(|e| {
            self.metrics.record_error("read");
            error!(error = %e, "error reading input file");
        })?;

        let stats = stats.snapshot();
        if cancel.is_cancelled() {
            warn!(
                successful_lines = stats.successful_lines,
                failed_lines = stats.failed_lines,
                "extraction cancelled"
            );
            return Err(ExtractError::Cancelled);
        }

        info!(
            input = %self.config.input_file_name().display(),
            output = self.config.output_file_name(),
            successful_lines = stats.successful_lines,
            failed_lines = stats.failed_lines,
            shards = summary.shards.len(),
            "processing completed"
        );

        Ok(ExtractionReport {
            stats,
            shards: summary.shards,
            rows_written: summary.rows_written,
            elapsed: started.elapsed(),
        })
    }
}

#[cfg(test)]
#[path = "manager_test.rs"]
mod tests;
