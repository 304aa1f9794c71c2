//! Transactional producer.
//!
//! [`TxnProducer`] is the seam between the publish protocol and librdkafka.
//! The rdkafka implementation runs every blocking transaction call on the
//! blocking thread pool.

use async_trait::async_trait;
use rdkafka::consumer::ConsumerGroupMetadata;
use rdkafka::error::KafkaError;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{BaseRecord, Producer, ThreadedProducer};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::delivery::{DeliveryContext, DeliverySender};
use crate::errors::{ClientError, TransportFault};
use crate::offsets::{positions_to_tpl, OffsetPosition};
use crate::records::OutboundRecord;
use crate::settings::KafkaSettings;

/// Operations of a transactional producer.
///
/// `send` only hands the record to the client; its outcome arrives later as
/// a [`DeliveryReport`](crate::DeliveryReport) tagged with `cycle`.
#[async_trait]
pub trait TxnProducer: Send + Sync {
    /// Group identity accepted by `send_offsets_to_transaction`.
    type GroupMetadata: Send + 'static;

    async fn begin_transaction(&self) -> Result<(), TransportFault>;

    fn send(&self, record: &OutboundRecord, cycle: u64) -> Result<(), TransportFault>;

    async fn flush(&self, timeout: Duration) -> Result<(), TransportFault>;

    async fn send_offsets_to_transaction(
        &self,
        positions: Vec<OffsetPosition>,
        metadata: Self::GroupMetadata,
        timeout: Duration,
    ) -> Result<(), TransportFault>;

    async fn commit_transaction(&self, timeout: Duration) -> Result<(), TransportFault>;

    async fn abort_transaction(&self, timeout: Duration) -> Result<(), TransportFault>;
}

/// librdkafka transactional producer.
#[derive(Clone)]
pub struct KafkaTxnProducer {
    transactional_id: String,
    inner: Arc<ThreadedProducer<DeliveryContext>>,
}

impl KafkaTxnProducer {
    /// Create the producer and initialize transactions.
    ///
    /// `init_transactions` fences any older producer with the same
    /// transactional id and recovers or aborts its open transaction.
    pub async fn new(
        settings: &KafkaSettings,
        transactional_id: &str,
        sender: DeliverySender,
    ) -> Result<Self, ClientError> {
        let producer: ThreadedProducer<DeliveryContext> = settings
            .producer_config(transactional_id)
            .create_with_context(DeliveryContext::new(sender))
            .map_err(|e| ClientError::Create(e.into()))?;

        let producer = Self {
            transactional_id: transactional_id.to_string(),
            inner: Arc::new(producer),
        };

        let timeout = Duration::from_millis(settings.transaction_timeout_ms);
        producer
            .blocking("init_transactions", move |p| p.init_transactions(timeout))
            .await
            .map_err(ClientError::InitTransactions)?;

        info!(
            transactional_id = %transactional_id,
            broker = %settings.broker,
            "Transactional producer ready"
        );
        Ok(producer)
    }

    pub fn transactional_id(&self) -> &str {
        &self.transactional_id
    }

    async fn blocking<F>(&self, op: &'static str, f: F) -> Result<(), TransportFault>
    where
        F: FnOnce(&ThreadedProducer<DeliveryContext>) -> Result<(), KafkaError> + Send + 'static,
    {
        let producer = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&producer))
            .await
            .map_err(|e| TransportFault::other(format!("{} task failed: {}", op, e)))?
            .map_err(TransportFault::from)
    }
}

#[async_trait]
impl TxnProducer for KafkaTxnProducer {
    type GroupMetadata = ConsumerGroupMetadata;

    async fn begin_transaction(&self) -> Result<(), TransportFault> {
        self.blocking("begin_transaction", |p| p.begin_transaction())
            .await
    }

    fn send(&self, record: &OutboundRecord, cycle: u64) -> Result<(), TransportFault> {
        let mut base = BaseRecord::<[u8], [u8], usize>::with_opaque_to(&record.topic, cycle as usize)
            .payload(record.payload.as_slice());
        if let Some(key) = &record.key {
            base = base.key(key.as_slice());
        }
        if !record.headers.is_empty() {
            let headers = record
                .headers
                .iter()
                .fold(OwnedHeaders::new(), |headers, header| {
                    headers.insert(Header {
                        key: &header.key,
                        value: Some(header.value.as_slice()),
                    })
                });
            base = base.headers(headers);
        }

        self.inner.send(base).map_err(|(e, _)| e.into())
    }

    async fn flush(&self, timeout: Duration) -> Result<(), TransportFault> {
        self.blocking("flush", move |p| p.flush(timeout)).await
    }

    async fn send_offsets_to_transaction(
        &self,
        positions: Vec<OffsetPosition>,
        metadata: ConsumerGroupMetadata,
        timeout: Duration,
    ) -> Result<(), TransportFault> {
        let tpl = positions_to_tpl(&positions)?;
        self.blocking("send_offsets_to_transaction", move |p| {
            p.send_offsets_to_transaction(&tpl, &metadata, timeout)
        })
        .await
    }

    async fn commit_transaction(&self, timeout: Duration) -> Result<(), TransportFault> {
        self.blocking("commit_transaction", move |p| p.commit_transaction(timeout))
            .await
    }

    async fn abort_transaction(&self, timeout: Duration) -> Result<(), TransportFault> {
        self.blocking("abort_transaction", move |p| p.abort_transaction(timeout))
            .await
    }
}
