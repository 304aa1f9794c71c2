//! Delivery confirmation channel.
//!
//! librdkafka reports the outcome of every produced message on its own
//! thread. [`DeliveryContext`] turns each report into a typed
//! [`DeliveryReport`] and pushes it into a bounded channel that the
//! publisher drains explicitly.

use rdkafka::client::ClientContext;
use rdkafka::message::Message;
use rdkafka::producer::{DeliveryResult, ProducerContext};
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::errors::TransportFault;

/// Outcome of one produced message.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    /// Publish cycle the message was submitted in.
    pub cycle: u64,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub error: Option<TransportFault>,
}

impl DeliveryReport {
    pub fn delivered(cycle: u64, topic: impl Into<String>, partition: i32, offset: i64) -> Self {
        Self {
            cycle,
            topic: topic.into(),
            partition,
            offset,
            error: None,
        }
    }

    pub fn failed(cycle: u64, topic: impl Into<String>, partition: i32, error: TransportFault) -> Self {
        Self {
            cycle,
            topic: topic.into(),
            partition,
            offset: -1,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Create a bounded delivery channel holding at most `capacity` reports.
///
/// The sender never blocks: the publisher keeps at most `capacity` messages
/// unconfirmed, so a full channel means that contract was broken and the
/// report is logged and dropped.
pub fn delivery_channel(capacity: usize) -> (DeliverySender, DeliveryReceiver) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    (DeliverySender { tx }, DeliveryReceiver { rx, capacity })
}

#[derive(Debug, Clone)]
pub struct DeliverySender {
    tx: mpsc::Sender<DeliveryReport>,
}

impl DeliverySender {
    /// Push a report without blocking the calling thread.
    pub fn send(&self, report: DeliveryReport) {
        match self.tx.try_send(report) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(report)) => {
                error!(
                    topic = %report.topic,
                    partition = report.partition,
                    "Delivery channel full, report dropped"
                );
            }
            Err(mpsc::error::TrySendError::Closed(report)) => {
                warn!(
                    topic = %report.topic,
                    partition = report.partition,
                    "Delivery channel closed, report dropped"
                );
            }
        }
    }
}

#[derive(Debug)]
pub struct DeliveryReceiver {
    rx: mpsc::Receiver<DeliveryReport>,
    capacity: usize,
}

impl DeliveryReceiver {
    /// Wait for the next report. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<DeliveryReport> {
        self.rx.recv().await
    }

    /// Take a report that has already arrived, if any.
    pub fn try_recv(&mut self) -> Option<DeliveryReport> {
        self.rx.try_recv().ok()
    }

    /// Maximum number of unread reports the channel holds.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Producer context forwarding delivery reports into a [`DeliverySender`].
///
/// The delivery opaque carries the publish cycle the message belongs to.
pub struct DeliveryContext {
    sender: DeliverySender,
}

impl DeliveryContext {
    pub fn new(sender: DeliverySender) -> Self {
        Self { sender }
    }
}

impl ClientContext for DeliveryContext {}

impl ProducerContext for DeliveryContext {
    type DeliveryOpaque = usize;

    fn delivery(&self, result: &DeliveryResult<'_>, cycle: Self::DeliveryOpaque) {
        let report = match result {
            Ok(message) => DeliveryReport::delivered(
                cycle as u64,
                message.topic(),
                message.partition(),
                message.offset(),
            ),
            Err((err, message)) => DeliveryReport::failed(
                cycle as u64,
                message.topic(),
                message.partition(),
                TransportFault::classify(err),
            ),
        };
        self.sender.send(report);
    }
}
