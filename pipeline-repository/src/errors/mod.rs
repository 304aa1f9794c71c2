//! Error types for the pipeline repository.
//!
//! `SearchIndexError` covers every failure talking to the search engine;
//! `BulkFlushError` is what a bulk flush returns, separating hard failures
//! from per-document partial failures.

mod bulk_flush_error;
mod search_index_error;

pub use bulk_flush_error::BulkFlushError;
pub use search_index_error::SearchIndexError;
