//! Error types for the pipeline worker ingest.

use pipeline_kafka::{OffsetError, PublishError};
use pipeline_repository::SearchIndexError;
use thiserror::Error;

/// Errors that can occur in the pipeline worker ingest.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Indexing failed and the batch can't be routed anywhere.
    #[error("Index error: {0}")]
    IndexError(#[from] SearchIndexError),

    /// Kafka-related error.
    #[error("Kafka error: {0}")]
    KafkaError(String),

    /// Transactional publish failed.
    #[error("Publish error: {0}")]
    PublishError(#[from] PublishError),

    /// Plain offset commit failed.
    #[error("Offset error: {0}")]
    OffsetError(#[from] OffsetError),

    /// Pipeline or index base lookup failed.
    #[error("Lookup error: {0}")]
    LookupError(String),
}

impl IngestError {
    /// Create a Kafka error.
    pub fn kafka(msg: impl Into<String>) -> Self {
        Self::KafkaError(msg.into())
    }

    /// Create a lookup error.
    pub fn lookup(msg: impl Into<String>) -> Self {
        Self::LookupError(msg.into())
    }
}

impl From<rdkafka::error::KafkaError> for IngestError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        Self::KafkaError(err.to_string())
    }
}
