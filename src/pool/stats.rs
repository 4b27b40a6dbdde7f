use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Line counters for one pipeline run, shared by the source and all workers.
///
/// Increments are relaxed; totals are read only after every writer of the
/// counters has been joined.
#[derive(Debug, Default)]
pub struct PipelineStats {
    lines_read: AtomicU64,
    successful_lines: AtomicU64,
    failed_lines: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_read(&self) {
        self.lines_read.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_success(&self) {
        self.successful_lines.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_failure(&self) {
        self.failed_lines.fetch_add(1, Ordering::Relaxed);
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read.load(Ordering::Relaxed)
    }

    pub fn successful_lines(&self) -> u64 {
        self.successful_lines.load(Ordering::Relaxed)
    }

    pub fn failed_lines(&self) -> u64 {
        self.failed_lines.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            lines_read: self.lines_read(),
            successful_lines: self.successful_lines(),
            failed_lines: self.failed_lines(),
        }
    }
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub lines_read: u64,
    pub successful_lines: u64,
    pub failed_lines: u64,
}

impl StatsSnapshot {
    /// Lines that went through a worker, decoded or not.
    pub fn processed(&self) -> u64 {
        self.successful_lines + self.failed_lines
    }
}
