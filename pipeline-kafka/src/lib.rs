//! Kafka plumbing for the stream pipeline worker.
//!
//! This crate builds the read-committed consumer and the transactional
//! producer, and implements the exactly-once publish protocol on top of them.
//!
//! ## Usage
//!
//! ```ignore
//! use pipeline_kafka::{
//!     create_consumer, delivery_channel, KafkaOffsetTracker, KafkaSettings, KafkaTxnProducer,
//!     PublisherConfig, TransactionalPublisher,
//! };
//! use std::sync::Arc;
//!
//! let settings = KafkaSettings::from_env()?;
//! let consumer = Arc::new(create_consumer(&settings, "acme.sdp.p1", &["input"])?);
//! let tracker = KafkaOffsetTracker::new(consumer.clone());
//!
//! let (sender, receiver) = delivery_channel(10_000);
//! let producer = KafkaTxnProducer::new(&settings, "p1_input", sender).await?;
//! let mut publisher = TransactionalPublisher::new(producer, receiver, PublisherConfig::new(timeout));
//!
//! publisher.produce_and_commit(&records, &tracker).await?;
//! ```

pub mod consumer;
pub mod delivery;
pub mod errors;
pub mod offsets;
pub mod producer;
pub mod publisher;
pub mod records;
pub mod settings;

pub use consumer::create_consumer;
pub use delivery::{delivery_channel, DeliveryContext, DeliveryReceiver, DeliveryReport, DeliverySender};
pub use errors::{ClientError, FaultKind, OffsetError, PublishError, TransportFault};
pub use offsets::{ConsumerAssignment, KafkaOffsetTracker, OffsetPosition, OffsetTracker, TopicPartition};
pub use producer::{KafkaTxnProducer, TxnProducer};
pub use publisher::{PublisherConfig, TransactionalPublisher, TxnState};
pub use records::{InboundRecord, OutboundRecord, RecordHeader};
pub use settings::KafkaSettings;

// Re-export commonly used rdkafka types for convenience
pub use rdkafka::consumer::{ConsumerGroupMetadata, StreamConsumer};
