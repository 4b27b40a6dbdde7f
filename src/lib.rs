//! # etl-extract
//!
//! Concurrent extraction of newline-delimited JSON into size-bounded CSV
//! shards, built on Tokio.
//!
//! ## Features
//!
//! - **Concurrent parsing** with a fixed pool of workers sharing one queue
//! - **Backpressure handling** via bounded channels
//! - **Shard rotation** at a configurable row count
//! - **Graceful cancellation** support
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use etl_extract::config::PipelineConfigBuilder;
//! use etl_extract::extract::ExtractionManager;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = PipelineConfigBuilder::default()
//!     .input_file_name("input.jsonl")
//!     .output_file_name("output-%d.csv")
//!     .num_workers(4usize)
//!     .lines_per_file(1000usize)
//!     .build()?;
//!
//! let manager = ExtractionManager::new(config)?;
//! let report = manager.run(&CancellationToken::new()).await?;
//! println!("{} ok, {} skipped", report.stats.successful_lines, report.stats.failed_lines);
//! ```
//!
//! ## Modules
//!
//! - [`extract`] - Line reader, shard writer and the pipeline coordinator
//! - [`pool`] - Worker pool and shared line counters
//! - [`config`] - Pipeline configuration loading and validation
//! - [`logging`], [`metrics`], [`health`] - Ambient services used by the binary

pub mod config;
pub mod extract;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod pool;
