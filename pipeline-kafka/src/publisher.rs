//! Exactly-once publish protocol.
//!
//! [`TransactionalPublisher::produce_and_commit`] publishes a batch of derived
//! messages and commits the consumer offsets of the records that produced
//! them in one producer transaction. Either both become visible to
//! read-committed consumers or neither does.

use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::delivery::DeliveryReceiver;
use crate::errors::{PublishError, TransportFault};
use crate::offsets::OffsetTracker;
use crate::producer::TxnProducer;
use crate::records::OutboundRecord;

pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_COMMIT_ATTEMPTS: u32 = 3;

/// Lifecycle of the transaction owned by a publisher.
///
/// `Idle -> Open -> ReadyToAttach -> OffsetsAttached -> Committed`, or
/// `-> AbortRequested -> Aborted` on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Idle,
    Open,
    ReadyToAttach,
    OffsetsAttached,
    Committed,
    AbortRequested,
    Aborted,
}

impl TxnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Open => "open",
            Self::ReadyToAttach => "ready_to_attach",
            Self::OffsetsAttached => "offsets_attached",
            Self::Committed => "committed",
            Self::AbortRequested => "abort_requested",
            Self::Aborted => "aborted",
        }
    }

    /// Whether a new cycle may start from this state.
    pub fn can_begin(&self) -> bool {
        matches!(self, Self::Idle | Self::Committed | Self::Aborted)
    }
}

impl fmt::Display for TxnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deadlines handed to the producer.
///
/// The producer enforces them itself. A call is never abandoned while it is
/// still running, so no abort can overtake a commit in flight.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Bound on attach offsets, each commit attempt and abort.
    pub transaction_timeout: Duration,
    /// Bound on the producer flush before offsets are read.
    pub flush_timeout: Duration,
    /// Commit calls made while the commit keeps failing with a retriable
    /// fault, such as a deadline expiry.
    pub commit_attempts: u32,
}

impl PublisherConfig {
    pub fn new(transaction_timeout: Duration) -> Self {
        Self {
            transaction_timeout,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
            commit_attempts: DEFAULT_COMMIT_ATTEMPTS,
        }
    }
}

/// Transactional publisher.
///
/// Owns the producer, its delivery channel and the transaction state. Only
/// one cycle runs at a time (`&mut self`).
pub struct TransactionalPublisher<P: TxnProducer> {
    producer: P,
    deliveries: DeliveryReceiver,
    config: PublisherConfig,
    state: TxnState,
    cycle: u64,
    /// Reports of the current cycle not read yet.
    unconfirmed: usize,
    /// Reports of earlier, failed cycles not read yet.
    stale: usize,
}

impl<P: TxnProducer> TransactionalPublisher<P> {
    pub fn new(producer: P, deliveries: DeliveryReceiver, config: PublisherConfig) -> Self {
        Self {
            producer,
            deliveries,
            config,
            state: TxnState::Idle,
            cycle: 0,
            unconfirmed: 0,
            stale: 0,
        }
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    pub fn producer(&self) -> &P {
        &self.producer
    }

    /// Publish `records` and commit the current position of `offsets` in
    /// one transaction.
    ///
    /// The position is read only after every record is confirmed and the
    /// producer is flushed, so the committed offsets never run ahead of
    /// durably published data.
    ///
    /// # Errors
    ///
    /// * `PublishError::Begin` - No transaction was opened; state stays as it was
    /// * `PublishError::CycleInProgress` - The previous cycle neither committed
    ///   nor aborted
    /// * `PublishError::Abort` - The cycle failed and so did the abort
    /// * any other variant - The cycle failed; the transaction was aborted
    ///   when the error required it
    #[instrument(skip_all, fields(records = records.len(), cycle = self.cycle + 1))]
    pub async fn produce_and_commit<T>(
        &mut self,
        records: &[OutboundRecord],
        offsets: &T,
    ) -> Result<(), PublishError>
    where
        T: OffsetTracker<GroupMetadata = P::GroupMetadata>,
    {
        if !self.state.can_begin() {
            return Err(PublishError::CycleInProgress(self.state.as_str()));
        }

        self.discard_stale_reports();
        self.cycle += 1;

        self.producer
            .begin_transaction()
            .await
            .map_err(PublishError::Begin)?;
        self.state = TxnState::Open;

        match self.run_cycle(records, offsets).await {
            Ok(()) => {
                self.state = TxnState::Committed;
                debug!(published = records.len(), "Transaction committed");
                Ok(())
            }
            Err(err) => {
                self.stale += std::mem::take(&mut self.unconfirmed);
                match self.abort_txn(&err).await {
                    Ok(()) => Err(err),
                    Err(fault) => Err(PublishError::Abort {
                        fault,
                        trigger: Box::new(err),
                    }),
                }
            }
        }
    }

    async fn run_cycle<T>(&mut self, records: &[OutboundRecord], offsets: &T) -> Result<(), PublishError>
    where
        T: OffsetTracker<GroupMetadata = P::GroupMetadata>,
    {
        let capacity = self.deliveries.capacity();

        for record in records {
            // Never more unread reports than the channel holds.
            while self.unconfirmed + self.stale >= capacity {
                self.read_report().await?;
            }

            self.producer
                .send(record, self.cycle)
                .map_err(|fault| PublishError::Submission {
                    topic: record.topic.clone(),
                    fault,
                })?;
            self.unconfirmed += 1;
        }

        while self.unconfirmed > 0 {
            self.read_report().await?;
        }

        self.producer
            .flush(self.config.flush_timeout)
            .await
            .map_err(|fault| {
                if fault.is_timed_out() {
                    PublishError::Timeout("flush")
                } else {
                    PublishError::Flush(fault)
                }
            })?;
        self.state = TxnState::ReadyToAttach;

        let assignment = offsets
            .current_assignment()
            .await
            .map_err(PublishError::Offsets)?;
        let positions = offsets
            .current_position(&assignment)
            .await
            .map_err(PublishError::Offsets)?;
        let metadata = offsets.group_metadata().await.map_err(PublishError::Offsets)?;

        let txn_timeout = self.config.transaction_timeout;
        self.producer
            .send_offsets_to_transaction(positions, metadata, txn_timeout)
            .await
            .map_err(PublishError::AttachOffsets)?;
        self.state = TxnState::OffsetsAttached;

        self.commit().await
    }

    /// Commit the open transaction.
    ///
    /// A retriable failure leaves the commit in progress inside the producer
    /// and may still land, so it is resumed by calling commit again and never
    /// answered with an abort. Only a fault flagged as requiring abort ends
    /// the transaction without committing it.
    async fn commit(&mut self) -> Result<(), PublishError> {
        let txn_timeout = self.config.transaction_timeout;
        let mut attempt = 1;
        loop {
            match self.producer.commit_transaction(txn_timeout).await {
                Ok(()) => return Ok(()),
                Err(fault) if fault.is_retriable() && attempt < self.config.commit_attempts => {
                    warn!(attempt, error = %fault, "Commit not confirmed, resuming");
                    attempt += 1;
                }
                Err(fault) => return Err(PublishError::Commit(fault)),
            }
        }
    }

    /// Read one delivery report. Reports of earlier cycles are discarded.
    async fn read_report(&mut self) -> Result<(), PublishError> {
        let Some(report) = self.deliveries.recv().await else {
            error!(missing = self.unconfirmed, "Delivery channel closed");
            return Err(PublishError::ChannelClosed {
                missing: self.unconfirmed,
            });
        };

        if report.cycle != self.cycle {
            self.stale = self.stale.saturating_sub(1);
            debug!(cycle = report.cycle, "Discarded stale delivery report");
            return Ok(());
        }

        self.unconfirmed = self.unconfirmed.saturating_sub(1);
        match report.error {
            Some(fault) => Err(PublishError::Delivery {
                topic: report.topic,
                partition: report.partition,
                fault,
            }),
            None => Ok(()),
        }
    }

    /// Drop reports left behind by a failed cycle that have already arrived.
    fn discard_stale_reports(&mut self) {
        let mut discarded = 0usize;
        while let Some(report) = self.deliveries.try_recv() {
            if report.cycle != self.cycle + 1 {
                self.stale = self.stale.saturating_sub(1);
                discarded += 1;
            }
        }
        if discarded > 0 {
            debug!(discarded, remaining = self.stale, "Discarded stale delivery reports");
        }
    }

    /// Abort the open transaction if `trigger` requires it.
    ///
    /// A "no transaction in progress" answer means the transaction is
    /// already gone and counts as success. Any other abort failure is
    /// returned and leaves the publisher in `AbortRequested`.
    pub async fn abort_txn(&mut self, trigger: &PublishError) -> Result<(), TransportFault> {
        if !trigger.requires_abort() {
            warn!(error = %trigger, state = %self.state, "Publish failed, no abort required");
            return Ok(());
        }

        self.state = TxnState::AbortRequested;
        let result = self
            .producer
            .abort_transaction(self.config.transaction_timeout)
            .await;

        match result {
            Ok(()) => {
                info!(error = %trigger, "Transaction aborted");
                self.state = TxnState::Aborted;
                Ok(())
            }
            Err(fault) if fault.is_no_transaction() => {
                debug!(error = %fault, "No transaction in progress, abort skipped");
                self.state = TxnState::Aborted;
                Ok(())
            }
            Err(fault) => {
                error!(error = %fault, trigger = %trigger, "Failed to abort transaction");
                Err(fault)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{delivery_channel, DeliveryReport, DeliverySender};
    use crate::errors::{FaultKind, OffsetError};
    use crate::offsets::{ConsumerAssignment, OffsetPosition, TopicPartition};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Step {
        Begin,
        Submit(usize),
        Deliver(usize),
        Attach,
        Flush,
        Commit,
        /// The first commit call lands on the broker but reports a deadline
        /// expiry to the caller.
        CommitLandsLate,
    }

    type CallLog = Arc<Mutex<Vec<&'static str>>>;

    /// Producer spy: keeps transaction contents pending until commit.
    struct SpyProducer {
        sender: DeliverySender,
        log: CallLog,
        fail: Option<(Step, FaultKind)>,
        abort_result: Mutex<Option<TransportFault>>,
        sent: Mutex<usize>,
        pending: Mutex<Vec<OutboundRecord>>,
        attached: Mutex<Vec<OffsetPosition>>,
        durable: Mutex<Vec<OutboundRecord>>,
        committed_offsets: Mutex<Vec<Vec<OffsetPosition>>>,
        commit_calls: Mutex<usize>,
        aborts: Mutex<usize>,
    }

    impl SpyProducer {
        fn new(sender: DeliverySender, log: CallLog) -> Self {
            Self {
                sender,
                log,
                fail: None,
                abort_result: Mutex::new(None),
                sent: Mutex::new(0),
                pending: Mutex::new(Vec::new()),
                attached: Mutex::new(Vec::new()),
                durable: Mutex::new(Vec::new()),
                committed_offsets: Mutex::new(Vec::new()),
                commit_calls: Mutex::new(0),
                aborts: Mutex::new(0),
            }
        }

        fn failing(mut self, step: Step, kind: FaultKind) -> Self {
            self.fail = Some((step, kind));
            self
        }

        fn injected(&self, step: Step) -> Option<TransportFault> {
            match self.fail {
                Some((s, kind)) if s == step => Some(TransportFault::new(kind, "injected")),
                _ => None,
            }
        }

        fn aborts(&self) -> usize {
            *self.aborts.lock().unwrap()
        }

        fn commit_calls(&self) -> usize {
            *self.commit_calls.lock().unwrap()
        }

        /// Make the open transaction durable.
        fn land(&self) {
            let records = std::mem::take(&mut *self.pending.lock().unwrap());
            self.durable.lock().unwrap().extend(records);
            let offsets = std::mem::take(&mut *self.attached.lock().unwrap());
            self.committed_offsets.lock().unwrap().push(offsets);
        }
    }

    #[async_trait]
    impl TxnProducer for SpyProducer {
        type GroupMetadata = String;

        async fn begin_transaction(&self) -> Result<(), TransportFault> {
            self.log.lock().unwrap().push("begin");
            match self.injected(Step::Begin) {
                Some(fault) => Err(fault),
                None => Ok(()),
            }
        }

        fn send(&self, record: &OutboundRecord, cycle: u64) -> Result<(), TransportFault> {
            let index = {
                let mut sent = self.sent.lock().unwrap();
                *sent += 1;
                *sent - 1
            };
            if let Some(fault) = self.injected(Step::Submit(index)) {
                return Err(fault);
            }
            self.log.lock().unwrap().push("send");
            self.pending.lock().unwrap().push(record.clone());

            let report = match self.injected(Step::Deliver(index)) {
                Some(fault) => DeliveryReport::failed(cycle, &record.topic, 0, fault),
                None => DeliveryReport::delivered(cycle, &record.topic, 0, index as i64),
            };
            self.sender.send(report);
            Ok(())
        }

        async fn flush(&self, _timeout: Duration) -> Result<(), TransportFault> {
            self.log.lock().unwrap().push("flush");
            match self.injected(Step::Flush) {
                Some(fault) => Err(fault),
                None => Ok(()),
            }
        }

        async fn send_offsets_to_transaction(
            &self,
            positions: Vec<OffsetPosition>,
            metadata: String,
            _timeout: Duration,
        ) -> Result<(), TransportFault> {
            assert_eq!(metadata, "acme.sdp.p1");
            self.log.lock().unwrap().push("attach");
            if let Some(fault) = self.injected(Step::Attach) {
                return Err(fault);
            }
            *self.attached.lock().unwrap() = positions;
            Ok(())
        }

        async fn commit_transaction(&self, _timeout: Duration) -> Result<(), TransportFault> {
            self.log.lock().unwrap().push("commit");
            let call = {
                let mut calls = self.commit_calls.lock().unwrap();
                *calls += 1;
                *calls
            };
            if self.fail.map(|(s, _)| s) == Some(Step::CommitLandsLate) {
                // The resumed call finds the transaction already committed.
                if call == 1 {
                    self.land();
                    return Err(TransportFault::new(FaultKind::Retriable, "commit timed out"));
                }
                return Ok(());
            }
            if let Some(fault) = self.injected(Step::Commit) {
                return Err(fault);
            }
            self.land();
            Ok(())
        }

        async fn abort_transaction(&self, _timeout: Duration) -> Result<(), TransportFault> {
            self.log.lock().unwrap().push("abort");
            *self.aborts.lock().unwrap() += 1;
            self.pending.lock().unwrap().clear();
            self.attached.lock().unwrap().clear();
            match self.abort_result.lock().unwrap().take() {
                Some(fault) => Err(fault),
                None => Ok(()),
            }
        }
    }

    struct SpyTracker {
        log: CallLog,
    }

    #[async_trait]
    impl OffsetTracker for SpyTracker {
        type GroupMetadata = String;

        async fn current_assignment(&self) -> Result<ConsumerAssignment, OffsetError> {
            self.log.lock().unwrap().push("assignment");
            Ok(ConsumerAssignment::new(vec![TopicPartition::new("input", 0)]))
        }

        async fn current_position(
            &self,
            _assignment: &ConsumerAssignment,
        ) -> Result<Vec<OffsetPosition>, OffsetError> {
            self.log.lock().unwrap().push("position");
            Ok(vec![OffsetPosition::new("input", 0, Some(100))])
        }

        async fn group_metadata(&self) -> Result<String, OffsetError> {
            self.log.lock().unwrap().push("metadata");
            Ok("acme.sdp.p1".to_string())
        }

        async fn commit_positions(&self, _positions: &[OffsetPosition]) -> Result<(), OffsetError> {
            self.log.lock().unwrap().push("direct_commit");
            Ok(())
        }
    }

    fn records(n: usize) -> Vec<OutboundRecord> {
        (0..n)
            .map(|i| OutboundRecord::new("acme.sdp.output.nginx", format!(r#"{{"n":{}}}"#, i)))
            .collect()
    }

    fn setup(
        capacity: usize,
        configure: impl FnOnce(SpyProducer) -> SpyProducer,
    ) -> (TransactionalPublisher<SpyProducer>, SpyTracker, CallLog) {
        let log: CallLog = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = delivery_channel(capacity);
        let producer = configure(SpyProducer::new(tx, log.clone()));
        let publisher = TransactionalPublisher::new(
            producer,
            rx,
            PublisherConfig::new(Duration::from_secs(5)),
        );
        (publisher, SpyTracker { log: log.clone() }, log)
    }

    #[tokio::test]
    async fn test_success_commits_once_after_deliveries_and_flush() {
        let (mut publisher, tracker, log) = setup(16, |p| p);

        publisher.produce_and_commit(&records(3), &tracker).await.unwrap();

        assert_eq!(publisher.state(), TxnState::Committed);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "begin", "send", "send", "send", "flush", "assignment", "position", "metadata",
                "attach", "commit"
            ]
        );
        let producer = publisher.producer();
        assert_eq!(producer.durable.lock().unwrap().len(), 3);
        assert_eq!(
            *producer.committed_offsets.lock().unwrap(),
            vec![vec![OffsetPosition::new("input", 0, Some(100))]]
        );
        assert_eq!(producer.aborts(), 0);
    }

    #[tokio::test]
    async fn test_in_flight_never_exceeds_channel_capacity() {
        let (mut publisher, tracker, _log) = setup(2, |p| p);

        publisher.produce_and_commit(&records(7), &tracker).await.unwrap();

        assert_eq!(publisher.producer().durable.lock().unwrap().len(), 7);
    }

    #[tokio::test]
    async fn test_no_commit_and_no_publish_on_any_injected_failure() {
        let cases = [
            Step::Submit(1),
            Step::Deliver(2),
            Step::Attach,
            Step::Commit,
        ];

        for step in cases {
            let (mut publisher, tracker, _log) =
                setup(16, |p| p.failing(step, FaultKind::RequiresAbort));

            let result = publisher.produce_and_commit(&records(3), &tracker).await;

            assert!(result.is_err(), "{:?} should fail the cycle", step);
            let producer = publisher.producer();
            assert!(producer.durable.lock().unwrap().is_empty(), "{:?}", step);
            assert!(producer.committed_offsets.lock().unwrap().is_empty(), "{:?}", step);
            assert_eq!(producer.aborts(), 1, "{:?}", step);
            assert_eq!(publisher.state(), TxnState::Aborted, "{:?}", step);
        }
    }

    #[tokio::test]
    async fn test_delivery_error_is_returned_after_abort() {
        let (mut publisher, tracker, log) = setup(16, |p| p.failing(Step::Deliver(0), FaultKind::Other));

        let err = publisher
            .produce_and_commit(&records(2), &tracker)
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::Delivery { .. }));
        assert!(!log.lock().unwrap().contains(&"position"));
    }

    #[tokio::test]
    async fn test_begin_failure_makes_no_abort_call() {
        let (mut publisher, tracker, _log) = setup(16, |p| p.failing(Step::Begin, FaultKind::Retriable));

        let err = publisher
            .produce_and_commit(&records(1), &tracker)
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::Begin(_)));
        assert_eq!(publisher.producer().aborts(), 0);
        assert_eq!(publisher.state(), TxnState::Idle);
    }

    #[tokio::test]
    async fn test_commit_failure_without_abort_flag_skips_abort() {
        let (mut publisher, tracker, _log) = setup(16, |p| p.failing(Step::Commit, FaultKind::Retriable));

        let err = publisher
            .produce_and_commit(&records(1), &tracker)
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::Commit(_)));
        assert_eq!(publisher.producer().commit_calls(), DEFAULT_COMMIT_ATTEMPTS as usize);
        assert_eq!(publisher.producer().aborts(), 0);
        assert_eq!(publisher.state(), TxnState::OffsetsAttached);

        // The transaction never reached a terminal state.
        let next = publisher.produce_and_commit(&records(1), &tracker).await;
        assert!(matches!(next, Err(PublishError::CycleInProgress(_))));
    }

    #[tokio::test]
    async fn test_abort_with_no_transaction_in_progress_is_suppressed() {
        let (mut publisher, tracker, _log) = setup(16, |p| p.failing(Step::Attach, FaultKind::RequiresAbort));
        *publisher.producer().abort_result.lock().unwrap() =
            Some(TransportFault::no_transaction("no transaction in progress"));

        let err = publisher
            .produce_and_commit(&records(1), &tracker)
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::AttachOffsets(_)));
        assert_eq!(publisher.state(), TxnState::Aborted);
    }

    #[tokio::test]
    async fn test_abort_txn_directly_suppresses_no_transaction() {
        let (mut publisher, _tracker, _log) = setup(16, |p| p);
        *publisher.producer().abort_result.lock().unwrap() =
            Some(TransportFault::no_transaction("no transaction in progress"));

        let trigger = PublishError::Commit(TransportFault::requires_abort_fault("commit failed"));
        assert!(publisher.abort_txn(&trigger).await.is_ok());
    }

    #[tokio::test]
    async fn test_abort_failure_is_reported_and_blocks_next_cycle() {
        let (mut publisher, tracker, _log) = setup(16, |p| p.failing(Step::Commit, FaultKind::RequiresAbort));
        *publisher.producer().abort_result.lock().unwrap() = Some(TransportFault::other("broker down"));

        let err = publisher
            .produce_and_commit(&records(1), &tracker)
            .await
            .unwrap_err();

        match err {
            PublishError::Abort { trigger, .. } => {
                assert!(matches!(*trigger, PublishError::Commit(_)))
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(publisher.state(), TxnState::AbortRequested);
        let next = publisher.produce_and_commit(&records(1), &tracker).await;
        assert!(matches!(next, Err(PublishError::CycleInProgress(_))));
    }

    #[tokio::test]
    async fn test_commit_deadline_is_resumed_not_aborted() {
        let (mut publisher, tracker, _log) =
            setup(16, |p| p.failing(Step::CommitLandsLate, FaultKind::Retriable));

        publisher.produce_and_commit(&records(2), &tracker).await.unwrap();

        let producer = publisher.producer();
        assert_eq!(producer.commit_calls(), 2);
        assert_eq!(producer.aborts(), 0);
        assert_eq!(publisher.state(), TxnState::Committed);

        // The next batch is committed once, on its own.
        publisher.produce_and_commit(&records(1), &tracker).await.unwrap();

        let producer = publisher.producer();
        assert_eq!(producer.durable.lock().unwrap().len(), 3);
        assert_eq!(producer.committed_offsets.lock().unwrap().len(), 2);
        assert_eq!(producer.aborts(), 0);
    }

    #[tokio::test]
    async fn test_flush_deadline_aborts_before_offsets_are_read() {
        let (mut publisher, tracker, log) = setup(16, |p| p.failing(Step::Flush, FaultKind::TimedOut));

        let err = publisher
            .produce_and_commit(&records(2), &tracker)
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::Timeout("flush")));
        assert_eq!(publisher.producer().aborts(), 1);
        assert!(publisher.producer().durable.lock().unwrap().is_empty());
        assert!(!log.lock().unwrap().contains(&"position"));
        assert_eq!(publisher.state(), TxnState::Aborted);
    }

    #[tokio::test]
    async fn test_stale_reports_are_discarded_by_next_cycle() {
        let (mut publisher, tracker, _log) =
            setup(4, |p| p.failing(Step::Deliver(0), FaultKind::RequiresAbort));

        // Reports for records 1 and 2 stay unread after the failure.
        assert!(publisher.produce_and_commit(&records(3), &tracker).await.is_err());
        assert_eq!(publisher.stale, 2);

        publisher.produce_and_commit(&records(4), &tracker).await.unwrap();

        assert_eq!(publisher.stale, 0);
        assert_eq!(publisher.state(), TxnState::Committed);
        assert_eq!(publisher.producer().durable.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_closed_channel_is_fatal() {
        let log: CallLog = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = delivery_channel(4);
        let (other_tx, _other_rx) = delivery_channel(4);
        // Reports go to a different channel, so the publisher's has no sender.
        let producer = SpyProducer::new(other_tx, log.clone());
        drop(tx);
        let mut publisher =
            TransactionalPublisher::new(producer, rx, PublisherConfig::new(Duration::from_secs(5)));
        let tracker = SpyTracker { log };

        let err = publisher
            .produce_and_commit(&records(1), &tracker)
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::ChannelClosed { missing: 1 }));
        assert!(err.is_fatal());
        assert_eq!(publisher.producer().aborts(), 0);
    }
}
