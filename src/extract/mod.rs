//! The extraction pipeline.
//!
//! ```text
//! input.jsonl ─▶ LineSource ─▶ [line queue] ─▶ N workers ─▶ [results queue] ─▶ ShardWriter ─▶ output-%d.csv
//! ```
//!
//! Both queues are bounded: a full queue suspends its producer, so memory use
//! does not grow with the input. Rows from different workers interleave, so
//! output order only matches input order with a single worker.

pub mod manager;
pub mod record;
pub mod source;
pub mod types;
pub mod writer;

pub use manager::ExtractionManager;
pub use record::{decode_line, DecodeError, ProjectedRow, Record, RecordCodec};
pub use source::LineSource;
pub use types::{ExtractError, ExtractionReport};
pub use writer::{ShardSummary, ShardWriter};
