//! # Pipeline Shared
//!
//! This crate defines shared data structures used across the stream pipeline
//! crates: the pipeline definition a worker runs and the index base its
//! documents are written to.

pub mod types;

pub use types::index_base::{index_alias, DocumentCategory, IndexBaseInfo};
pub use types::pipeline::{error_topic_name, output_topic_name, PipelineConfig};
