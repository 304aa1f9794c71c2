//! Processor module for the pipeline worker ingest.
//!
//! Turns input records into bulk index items and the copies republished
//! after indexing.

mod document;
mod record_processor;

pub use document::{Document, METRIC_ROUTING_WINDOW_SECS};
pub use record_processor::{ProcessedRecord, RecordCopy, RecordProcessor, PIPELINE_ID_HEADER};
