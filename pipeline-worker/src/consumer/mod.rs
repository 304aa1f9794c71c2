//! Consumer module for the pipeline worker ingest.
//!
//! Provides the record source the orchestrator polls and its Kafka
//! implementation.

mod kafka_consumer;

pub use kafka_consumer::KafkaConsumer;

use async_trait::async_trait;
use pipeline_kafka::InboundRecord;
use std::time::Duration;

use crate::errors::IngestError;

/// Source of input records.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Wait up to `timeout` for the next record.
    ///
    /// `Ok(None)` means nothing arrived in time.
    async fn poll(&self, timeout: Duration) -> Result<Option<InboundRecord>, IngestError>;
}
