//! # Pipeline Repository
//!
//! This crate builds bulk requests for the search index and sends them. It
//! includes the write buffer, the buffered client that reports per-document
//! failures, the transport trait and a concrete implementation for OpenSearch.

pub mod bulk;
pub mod client;
pub mod config;
pub mod errors;
pub mod interfaces;
pub mod opensearch;

pub use bulk::{BulkAction, BulkBody, BulkItem, BulkWriteBuffer};
pub use client::{FlushOutcome, SearchBulkClient};
pub use config::BulkClientConfig;
pub use errors::{BulkFlushError, SearchIndexError};
pub use interfaces::{BulkHttpResponse, BulkTransport};
pub use opensearch::OpenSearchBulkTransport;
