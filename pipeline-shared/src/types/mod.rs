//! This module defines the core data structures used across the pipeline.
//! It re-exports `PipelineConfig`, `IndexBaseInfo` and `DocumentCategory`.

pub mod index_base;
pub mod pipeline;

pub use index_base::{DocumentCategory, IndexBaseInfo};
pub use pipeline::{error_topic_name, output_topic_name, PipelineConfig};
