//! # Pipeline Worker
//!
//! Stream pipeline worker - consumes records from Kafka, indexes them into
//! OpenSearch and republishes each record to an output or error topic with
//! exactly-once semantics.
//!
//! ## Architecture
//!
//! The worker follows the Consumer-Processor-Loader pattern:
//!
//! 1. **Consumer**: Polls records from the input topic
//! 2. **Processor**: Turns records into search documents
//! 3. **Loader**: Bulk indexes documents into OpenSearch
//! 4. **Orchestrator**: Batches records and publishes their copies together
//!    with the consumer offsets in one Kafka transaction
//!
//! ## Modules
//!
//! - [`config`]: Settings, collaborators and dependency initialization
//! - [`consumer`]: Record source and its Kafka implementation
//! - [`processor`]: Transforms records into documents
//! - [`loader`]: Indexes documents into OpenSearch
//! - [`orchestrator`]: Coordinates the ingest flow
//! - [`errors`]: Error types for the worker

pub mod config;
pub mod consumer;
pub mod errors;
pub mod loader;
pub mod orchestrator;
pub mod processor;

pub use config::{Dependencies, WorkerSettings};
pub use errors::IngestError;

use thiserror::Error;

/// Errors that can occur during worker initialization or execution.
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Ingest error.
    #[error("Ingest error: {0}")]
    IngestError(#[from] IngestError),
}

impl IndexingError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
