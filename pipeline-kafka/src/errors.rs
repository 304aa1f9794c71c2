//! Error types for the Kafka side of the pipeline.
//!
//! Every rdkafka failure is classified once into a [`TransportFault`]. Its
//! [`FaultKind`] carries the behavioral flags the publish protocol needs
//! (must the transaction be aborted, is this a "no transaction" error) so
//! nothing downstream inspects error strings.

use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use thiserror::Error;

/// How a transport failure affects the open transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The transaction is unusable and must be aborted.
    RequiresAbort,
    /// The broker has no transaction in progress for this producer.
    NoTransactionInProgress,
    /// The operation may be retried as is.
    Retriable,
    /// The producer instance is unusable (fenced, misconfigured).
    Fatal,
    /// A local deadline expired before the operation finished.
    TimedOut,
    Other,
}

/// A classified transport failure.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportFault {
    kind: FaultKind,
    message: String,
}

impl TransportFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn requires_abort_fault(message: impl Into<String>) -> Self {
        Self::new(FaultKind::RequiresAbort, message)
    }

    pub fn no_transaction(message: impl Into<String>) -> Self {
        Self::new(FaultKind::NoTransactionInProgress, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Other, message)
    }

    /// Classify an rdkafka error.
    pub fn classify(err: &KafkaError) -> Self {
        let kind = match err {
            KafkaError::Transaction(e) if e.txn_requires_abort() => FaultKind::RequiresAbort,
            KafkaError::Transaction(e) if e.code() == RDKafkaErrorCode::State => {
                FaultKind::NoTransactionInProgress
            }
            KafkaError::Transaction(e) if e.is_fatal() => FaultKind::Fatal,
            KafkaError::Transaction(e) if e.is_retriable() => FaultKind::Retriable,
            other => match other.rdkafka_error_code() {
                Some(RDKafkaErrorCode::State) => FaultKind::NoTransactionInProgress,
                Some(RDKafkaErrorCode::Fatal) | Some(RDKafkaErrorCode::Fenced) => FaultKind::Fatal,
                Some(RDKafkaErrorCode::OperationTimedOut) => FaultKind::TimedOut,
                _ => FaultKind::Other,
            },
        };
        Self::new(kind, err.to_string())
    }

    pub fn kind(&self) -> FaultKind {
        self.kind
    }

    pub fn requires_abort(&self) -> bool {
        self.kind == FaultKind::RequiresAbort
    }

    pub fn is_no_transaction(&self) -> bool {
        self.kind == FaultKind::NoTransactionInProgress
    }

    pub fn is_retriable(&self) -> bool {
        self.kind == FaultKind::Retriable
    }

    pub fn is_fatal(&self) -> bool {
        self.kind == FaultKind::Fatal
    }

    pub fn is_timed_out(&self) -> bool {
        self.kind == FaultKind::TimedOut
    }
}

impl From<KafkaError> for TransportFault {
    fn from(err: KafkaError) -> Self {
        Self::classify(&err)
    }
}

/// Errors reading or committing consumer offsets.
#[derive(Debug, Clone, Error)]
pub enum OffsetError {
    #[error("Failed to read assignment: {0}")]
    Assignment(#[source] TransportFault),

    #[error("Failed to read position: {0}")]
    Position(#[source] TransportFault),

    #[error("Consumer group metadata unavailable")]
    GroupMetadataUnavailable,

    #[error("Failed to commit offsets: {0}")]
    Commit(#[source] TransportFault),
}

/// Errors from one `produce_and_commit` cycle.
#[derive(Debug, Clone, Error)]
pub enum PublishError {
    #[error("Failed to begin transaction: {0}")]
    Begin(#[source] TransportFault),

    #[error("Failed to submit message to {topic}: {fault}")]
    Submission { topic: String, fault: TransportFault },

    #[error("Delivery to {topic}[{partition}] failed: {fault}")]
    Delivery {
        topic: String,
        partition: i32,
        fault: TransportFault,
    },

    #[error("Delivery channel closed with {missing} reports outstanding")]
    ChannelClosed { missing: usize },

    #[error("Failed to flush producer: {0}")]
    Flush(#[source] TransportFault),

    #[error("Failed to read consumer offsets: {0}")]
    Offsets(#[source] OffsetError),

    #[error("Failed to attach offsets to transaction: {0}")]
    AttachOffsets(#[source] TransportFault),

    #[error("Failed to commit transaction: {0}")]
    Commit(#[source] TransportFault),

    #[error("Timed out during {0}")]
    Timeout(&'static str),

    #[error("Previous publish cycle is still {0}")]
    CycleInProgress(&'static str),

    #[error("Failed to abort transaction after \"{trigger}\": {fault}")]
    Abort {
        fault: TransportFault,
        trigger: Box<PublishError>,
    },
}

impl PublishError {
    /// Whether the open transaction has to be aborted after this error.
    ///
    /// Failures inside an open transaction always require it. Begin never
    /// opened one. Attach and commit failures follow the broker's verdict.
    pub fn requires_abort(&self) -> bool {
        match self {
            Self::Begin(_)
            | Self::ChannelClosed { .. }
            | Self::CycleInProgress(_)
            | Self::Abort { .. } => false,
            Self::Submission { .. }
            | Self::Delivery { .. }
            | Self::Flush(_)
            | Self::Offsets(_)
            | Self::Timeout(_) => true,
            Self::AttachOffsets(fault) | Self::Commit(fault) => fault.requires_abort(),
        }
    }

    /// The transport fault behind this error, if any.
    pub fn fault(&self) -> Option<&TransportFault> {
        match self {
            Self::Begin(fault)
            | Self::Flush(fault)
            | Self::AttachOffsets(fault)
            | Self::Commit(fault) => Some(fault),
            Self::Submission { fault, .. }
            | Self::Delivery { fault, .. }
            | Self::Abort { fault, .. } => Some(fault),
            Self::Offsets(_)
            | Self::ChannelClosed { .. }
            | Self::Timeout(_)
            | Self::CycleInProgress(_) => None,
        }
    }

    /// Whether the producer can no longer be used at all.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ChannelClosed { .. })
            || self.fault().is_some_and(TransportFault::is_fatal)
    }
}

/// Errors building Kafka clients.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid Kafka configuration: {0}")]
    Config(String),

    #[error("Failed to create Kafka client: {0}")]
    Create(#[source] TransportFault),

    #[error("Failed to initialize transactions: {0}")]
    InitTransactions(#[source] TransportFault),
}

impl ClientError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_state_code_as_no_transaction() {
        let err = KafkaError::Flush(RDKafkaErrorCode::State);
        let fault = TransportFault::classify(&err);
        assert!(fault.is_no_transaction());
        assert!(!fault.requires_abort());
    }

    #[test]
    fn test_classify_fenced_as_fatal() {
        let fault: TransportFault = KafkaError::Flush(RDKafkaErrorCode::Fenced).into();
        assert!(fault.is_fatal());
    }

    #[test]
    fn test_classify_flush_deadline_as_timed_out() {
        let fault: TransportFault = KafkaError::Flush(RDKafkaErrorCode::OperationTimedOut).into();
        assert!(fault.is_timed_out());
        assert!(!fault.requires_abort());
    }

    #[test]
    fn test_classify_generic_error_as_other() {
        let fault: TransportFault =
            KafkaError::MessageProduction(RDKafkaErrorCode::MessageSizeTooLarge).into();
        assert_eq!(fault.kind(), FaultKind::Other);
    }

    #[test]
    fn test_begin_never_requires_abort() {
        let err = PublishError::Begin(TransportFault::requires_abort_fault("boom"));
        assert!(!err.requires_abort());
    }

    #[test]
    fn test_commit_follows_fault_flag() {
        let abortable = PublishError::Commit(TransportFault::requires_abort_fault("x"));
        let retriable = PublishError::Commit(TransportFault::new(FaultKind::Retriable, "x"));
        assert!(abortable.requires_abort());
        assert!(!retriable.requires_abort());
    }

    #[test]
    fn test_in_transaction_failures_require_abort() {
        let delivery = PublishError::Delivery {
            topic: "out".to_string(),
            partition: 0,
            fault: TransportFault::other("msg too large"),
        };
        assert!(delivery.requires_abort());
        assert!(PublishError::Timeout("flush").requires_abort());
    }
}
