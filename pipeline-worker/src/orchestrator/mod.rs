//! Orchestrator module for the pipeline worker ingest.
//!
//! Coordinates the record source, processor, loader and transactional
//! publisher. Each batch is indexed, then its copies are published and the
//! consumer position committed in one Kafka transaction.

use pipeline_kafka::{
    InboundRecord, OffsetTracker, OutboundRecord, TransactionalPublisher, TxnProducer,
};
use pipeline_repository::BulkItem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio::time::{interval, sleep, Duration};
use tracing::{debug, error, info, instrument, warn};

use crate::consumer::RecordSource;
use crate::errors::IngestError;
use crate::loader::{FailedDocumentPolicy, IndexLoader, IndexReport};
use crate::processor::{RecordCopy, RecordProcessor};

pub const DEFAULT_FLUSH_BYTES: usize = 5 * 1024 * 1024;
pub const DEFAULT_FLUSH_ITEMS: usize = 10_000;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Flush once the batch payloads reach this many bytes.
    pub flush_bytes: usize,
    /// Flush once the batch holds this many records.
    pub flush_items: usize,
    /// Flush a non-empty batch at least this often.
    pub flush_interval: Duration,
    pub poll_timeout: Duration,
    /// Pause after a failed poll or publish.
    pub retry_interval: Duration,
    /// Consecutive poll or publish failures tolerated before giving up.
    pub failure_threshold: u32,
    pub progress_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            flush_bytes: DEFAULT_FLUSH_BYTES,
            flush_items: DEFAULT_FLUSH_ITEMS,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            retry_interval: Duration::from_millis(3000),
            failure_threshold: 10,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

/// Handle that stops a running orchestrator.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: broadcast::Sender<()>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(());
    }
}

/// Running totals since startup.
#[derive(Debug, Default)]
pub struct IngestCounters {
    pub records_consumed: AtomicU64,
    pub documents_indexed: AtomicU64,
    pub documents_failed: AtomicU64,
    pub batches_committed: AtomicU64,
}

#[derive(Default)]
struct Batch {
    records: Vec<InboundRecord>,
    bytes: usize,
}

impl Batch {
    fn push(&mut self, record: InboundRecord) {
        self.bytes += record.payload_len();
        self.records.push(record);
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn take(&mut self) -> Vec<InboundRecord> {
        self.bytes = 0;
        std::mem::take(&mut self.records)
    }
}

/// Orchestrator that coordinates the ingest components.
///
/// The orchestrator:
/// - Polls records and batches them by size, count and age
/// - Indexes each batch and builds its output and error copies
/// - Publishes the copies and commits the consumer position atomically
/// - Handles shutdown signals
/// - Logs ingest progress
pub struct PipelineOrchestrator<S, P, T>
where
    S: RecordSource,
    P: TxnProducer,
    T: OffsetTracker<GroupMetadata = P::GroupMetadata>,
{
    source: S,
    offsets: T,
    processor: RecordProcessor,
    loader: IndexLoader,
    publisher: TransactionalPublisher<P>,
    config: OrchestratorConfig,
    shutdown_tx: broadcast::Sender<()>,
    counters: Arc<IngestCounters>,
}

impl<S, P, T> PipelineOrchestrator<S, P, T>
where
    S: RecordSource,
    P: TxnProducer,
    T: OffsetTracker<GroupMetadata = P::GroupMetadata>,
{
    /// Create a new orchestrator with the given components.
    pub fn new(
        source: S,
        offsets: T,
        processor: RecordProcessor,
        loader: IndexLoader,
        publisher: TransactionalPublisher<P>,
        config: OrchestratorConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            source,
            offsets,
            processor,
            loader,
            publisher,
            config,
            shutdown_tx,
            counters: Arc::new(IngestCounters::default()),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    pub fn counters(&self) -> Arc<IngestCounters> {
        Arc::clone(&self.counters)
    }

    /// Run the orchestrator.
    ///
    /// Blocks until a shutdown signal is received or an error occurs. A batch
    /// that was not committed yet is dropped on shutdown and re-read by the
    /// next worker that owns its partitions.
    #[instrument(skip(self), fields(pipeline_id = %self.processor.pipeline().pipeline_id))]
    pub async fn run(&mut self) -> Result<(), IngestError> {
        info!("Starting pipeline orchestrator");

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut progress_timer = interval(self.config.progress_interval);
        progress_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut progress = ProgressTracker::new();

        let mut batch = Batch::default();
        let mut last_flush = Instant::now();
        let mut poll_failures: u32 = 0;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutdown requested");
                    break;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
                _ = progress_timer.tick() => {
                    progress.log(&self.counters);
                }
                polled = self.source.poll(self.config.poll_timeout) => {
                    match polled {
                        Ok(Some(record)) => {
                            poll_failures = 0;
                            batch.push(record);
                        }
                        Ok(None) => poll_failures = 0,
                        Err(e) => {
                            poll_failures += 1;
                            if poll_failures >= self.config.failure_threshold {
                                error!(error = %e, failures = poll_failures, "Giving up on record source");
                                return Err(e);
                            }
                            warn!(error = %e, failures = poll_failures, "Failed to poll record");
                            sleep(self.config.retry_interval).await;
                            continue;
                        }
                    }

                    if self.flush_due(&batch, last_flush) {
                        let records = batch.take();
                        self.process_batch(records).await?;
                        last_flush = Instant::now();
                    } else if batch.is_empty() {
                        // Age a batch from its first record, not from an idle period.
                        last_flush = Instant::now();
                    }
                }
            }
        }

        info!(
            total_records_consumed = self.counters.records_consumed.load(Ordering::Relaxed),
            total_documents_indexed = self.counters.documents_indexed.load(Ordering::Relaxed),
            total_documents_failed = self.counters.documents_failed.load(Ordering::Relaxed),
            dropped_records = batch.len(),
            "Orchestrator shutdown complete"
        );
        Ok(())
    }

    fn flush_due(&self, batch: &Batch, last_flush: Instant) -> bool {
        if batch.is_empty() {
            return false;
        }
        batch.bytes >= self.config.flush_bytes
            || batch.len() >= self.config.flush_items
            || last_flush.elapsed() >= self.config.flush_interval
    }

    /// Index one batch and publish its copies with the consumer position.
    #[instrument(skip(self, records), fields(record_count = records.len()))]
    async fn process_batch(&mut self, records: Vec<InboundRecord>) -> Result<(), IngestError> {
        self.counters
            .records_consumed
            .fetch_add(records.len() as u64, Ordering::Relaxed);

        let (items, copies): (Vec<BulkItem>, Vec<RecordCopy>) = self
            .processor
            .process_batch(&records)
            .into_iter()
            .map(|processed| (processed.item, processed.copy))
            .unzip();

        let report = if items.is_empty() {
            IndexReport::default()
        } else {
            self.loader.index(items).await?
        };
        self.counters
            .documents_indexed
            .fetch_add(report.indexed as u64, Ordering::Relaxed);
        self.counters
            .documents_failed
            .fetch_add(report.failed_count() as u64, Ordering::Relaxed);

        // An empty batch still goes through a transaction so its offsets move
        // only with a producer commit.
        let messages = self.derive_messages(&copies, &report);
        self.publish(&messages).await?;

        self.counters
            .batches_committed
            .fetch_add(1, Ordering::Relaxed);
        debug!(
            indexed = report.indexed,
            failed = report.failed_count(),
            published = messages.len(),
            "Batch committed"
        );
        Ok(())
    }

    /// Output copies for indexed documents, error copies for failed ones.
    fn derive_messages(&self, copies: &[RecordCopy], report: &IndexReport) -> Vec<OutboundRecord> {
        let pipeline = self.processor.pipeline();
        let policy = self.loader.config().policy;

        copies
            .iter()
            .filter_map(|copy| {
                if !report.is_failed(&copy.document_id) {
                    return Some(copy.to_output(&pipeline.pipeline_id));
                }
                match policy {
                    FailedDocumentPolicy::RouteToErrorTopic => {
                        Some(copy.to_error(&pipeline.error_topic, &pipeline.pipeline_id))
                    }
                    FailedDocumentPolicy::ReportOnly => {
                        warn!(document_id = %copy.document_id, "Document failed to index");
                        None
                    }
                }
            })
            .collect()
    }

    /// Publish with retry while the publisher can start a new cycle.
    ///
    /// A failed cycle leaves the consumer position untouched, so a retry
    /// commits the same offsets.
    async fn publish(&mut self, messages: &[OutboundRecord]) -> Result<(), IngestError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match self.publisher.produce_and_commit(messages, &self.offsets).await {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            let state = self.publisher.state();
            if err.is_fatal() || !state.can_begin() || attempt >= self.config.failure_threshold {
                error!(
                    error = %err,
                    attempt,
                    state = %state,
                    "Transactional publish failed"
                );
                return Err(err.into());
            }

            warn!(error = %err, attempt, "Transactional publish failed, retrying");
            sleep(self.config.retry_interval).await;
        }
    }

    /// Trigger a graceful shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

struct ProgressTracker {
    prev_records: u64,
    prev_docs: u64,
    prev_time: Instant,
}

impl ProgressTracker {
    fn new() -> Self {
        Self {
            prev_records: 0,
            prev_docs: 0,
            prev_time: Instant::now(),
        }
    }

    fn log(&mut self, counters: &IngestCounters) {
        let records = counters.records_consumed.load(Ordering::Relaxed);
        let docs = counters.documents_indexed.load(Ordering::Relaxed);

        let now = Instant::now();
        let elapsed_secs = now.duration_since(self.prev_time).as_secs_f64();
        let rate = |current: u64, previous: u64| {
            if elapsed_secs > 0.0 {
                (current.saturating_sub(previous) as f64) / elapsed_secs
            } else {
                0.0
            }
        };

        info!(
            records_consumed = records,
            documents_indexed = docs,
            documents_failed = counters.documents_failed.load(Ordering::Relaxed),
            batches_committed = counters.batches_committed.load(Ordering::Relaxed),
            records_per_sec = format!("{:.2}", rate(records, self.prev_records)),
            documents_per_sec = format!("{:.2}", rate(docs, self.prev_docs)),
            "Processing progress"
        );

        self.prev_records = records;
        self.prev_docs = docs;
        self.prev_time = now;
    }
}
