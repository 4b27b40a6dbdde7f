use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::decoder::LineDecoder;
use super::stats::PipelineStats;
use super::types::PoolError;
use crate::metrics::MetricsSink;

/// Fixed-size set of workers pulling from one shared line queue.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    num_workers: usize,
}

/// Handle to a running pool.
///
/// The pool's supervisor owns the last results-queue sender and drops it only
/// after every worker has returned, so the results queue closes exactly once.
pub struct PoolHandle {
    supervisor: JoinHandle<Result<(), PoolError>>,
}

impl PoolHandle {
    /// Waits until every worker has returned and the results queue is closed.
    pub async fn join(self) -> Result<(), PoolError> {
        match self.supervisor.await {
            Ok(result) => result,
            Err(e) => Err(PoolError::SupervisorFailed(e)),
        }
    }
}

impl WorkerPool {
    pub fn new(num_workers: usize) -> Self {
        WorkerPool { num_workers }
    }

    #[inline]
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Starts the workers and the supervisor.
    ///
    /// Each worker receives the next available line, so load balances itself.
    /// A line that is not valid UTF-8 fails like any other malformed line.
    /// Decode failures are counted and logged; successful rows are sent to
    /// `results`, waiting while that queue is full.
    pub fn spawn<D>(
        &self,
        lines: mpsc::Receiver<Vec<u8>>,
        results: mpsc::Sender<D::Output>,
        decoder: Arc<D>,
        stats: Arc<PipelineStats>,
        metrics: Arc<dyn MetricsSink>,
        cancel: &CancellationToken,
    ) -> PoolHandle
    where
        D: LineDecoder + 'static,
    {
        let receiver = Arc::new(Mutex::new(lines));
        let mut handles = Vec::with_capacity(self.num_workers);

        for worker_id in 0..self.num_workers {
            let worker = Worker {
                id: worker_id,
                receiver: Arc::clone(&receiver),
                results: results.clone(),
                decoder: Arc::clone(&decoder),
                stats: Arc::clone(&stats),
                metrics: Arc::clone(&metrics),
                cancel: cancel.clone(),
            };
            handles.push(tokio::spawn(worker.run()));
        }
        drop(receiver);

        let supervisor = tokio::spawn(async move {
            let outcomes = join_all(handles).await;
            // No worker can publish any more.
            drop(results);

            let mut errors: Vec<PoolError> = outcomes
                .into_iter()
                .enumerate()
                .filter_map(|(worker_id, outcome)| {
                    outcome
                        .err()
                        .map(|source| PoolError::WorkerPanicked { worker_id, source })
                })
                .collect();

            match errors.len() {
                0 => Ok(()),
                1 => Err(errors.remove(0)),
                _ => Err(PoolError::MultipleErrors(errors)),
            }
        });

        PoolHandle { supervisor }
    }
}

struct Worker<D: LineDecoder> {
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Vec<u8>>>>,
    results: mpsc::Sender<D::Output>,
    decoder: Arc<D>,
    stats: Arc<PipelineStats>,
    metrics: Arc<dyn MetricsSink>,
    cancel: CancellationToken,
}

impl<D: LineDecoder> Worker<D> {
    async fn run(self) {
        let _active = ActiveWorker::enter(Arc::clone(&self.metrics));
        self.process_lines().await;
    }

    async fn process_lines(&self) {
        loop {
            let line = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!(worker_id = self.id, "worker cancelled");
                    return;
                }

                line = async {
                    let mut rx = self.receiver.lock().await;
                    rx.recv().await
                } => line,
            };

            let Some(line) = line else {
                debug!(worker_id = self.id, "line queue drained");
                return;
            };

            let started = Instant::now();
            let decoded = match std::str::from_utf8(&line) {
                Ok(text) => self.decoder.decode(text).map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            self.metrics.observe_duration("decode", started.elapsed());

            let row = match decoded {
                Ok(row) => row,
                Err(error) => {
                    self.stats.record_failure();
                    self.metrics.record_error("decode");
                    warn!(worker_id = self.id, %error, "malformed JSON skipped");
                    continue;
                }
            };
            self.stats.record_success();

            let sent = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => false,
                sent = self.results.send(row) => sent.is_ok(),
            };
            if !sent {
                debug!(worker_id = self.id, "results queue closed");
                return;
            }
        }
    }
}

/// Holds one slot of the active-workers gauge; released on return or panic.
struct ActiveWorker {
    metrics: Arc<dyn MetricsSink>,
}

impl ActiveWorker {
    fn enter(metrics: Arc<dyn MetricsSink>) -> Self {
        metrics.add_active_workers(1);
        ActiveWorker { metrics }
    }
}

impl Drop for ActiveWorker {
    fn drop(&mut self) {
        self.metrics.add_active_workers(-1);
    }
}
