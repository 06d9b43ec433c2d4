//! Ingestion-and-annotation pipeline.
//!
//! Each run lists unread mail, takes up to the batch ceiling, and for each
//! message: fetch → summarize → categorize → append record → mark read.

pub mod processor;
pub mod types;

pub use processor::AnnotationPipeline;
pub use types::{MessageOutcome, MessageState, RunStats, WatchSummary};
