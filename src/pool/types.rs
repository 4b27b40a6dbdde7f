use thiserror::Error;
use tokio::task::JoinError;

/// Errors that can occur while running the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// A worker task panicked or was aborted.
    ///
    /// Preserves the join error for debugging.
    #[error("worker {worker_id} failed")]
    WorkerPanicked {
        worker_id: usize,
        #[source]
        source: JoinError,
    },

    /// The supervisor that closes the results queue did not finish.
    #[error("pool supervisor failed")]
    SupervisorFailed(#[source] JoinError),

    /// More than one worker failed.
    ///
    /// Contains all worker errors for debugging.
    #[error("{} worker(s) failed", .0.len())]
    MultipleErrors(Vec<PoolError>),
}
