//! Kafka consumer implementation for the pipeline worker.
//!
//! Wraps the read-committed `StreamConsumer` shared with the offset tracker.

use async_trait::async_trait;
use pipeline_kafka::{InboundRecord, StreamConsumer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::consumer::RecordSource;
use crate::errors::IngestError;

/// Kafka consumer for pipeline input records.
///
/// The consumer is subscribed when it is created; its position only moves
/// forward as records are polled. Offsets are committed elsewhere, either
/// inside the publish transaction or by an explicit checkpoint.
pub struct KafkaConsumer {
    consumer: Arc<StreamConsumer>,
}

impl KafkaConsumer {
    /// Wrap a subscribed consumer.
    pub fn new(consumer: Arc<StreamConsumer>) -> Self {
        Self { consumer }
    }

    /// The underlying consumer, shared with the offset tracker.
    pub fn inner(&self) -> Arc<StreamConsumer> {
        Arc::clone(&self.consumer)
    }
}

#[async_trait]
impl RecordSource for KafkaConsumer {
    #[instrument(skip(self), level = "trace")]
    async fn poll(&self, timeout: Duration) -> Result<Option<InboundRecord>, IngestError> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => Ok(None),
            Ok(Ok(message)) => {
                let record = InboundRecord::from_message(&message);
                debug!(
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    "Received record"
                );
                Ok(Some(record))
            }
            Ok(Err(e)) => Err(e.into()),
        }
    }
}
