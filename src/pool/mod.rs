pub mod decoder;
pub mod pool;
pub mod stats;
pub mod types;

pub use decoder::LineDecoder;
pub use pool::{PoolHandle, WorkerPool};
pub use stats::{PipelineStats, StatsSnapshot};
pub use types::PoolError;
