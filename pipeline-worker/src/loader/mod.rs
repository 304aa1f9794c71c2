//! Loader module for the pipeline worker ingest.
//!
//! Writes a batch of bulk items to the search index, retrying the whole
//! request until it succeeds or the failure threshold is reached.

use pipeline_repository::{BulkFlushError, BulkItem, SearchBulkClient};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

use crate::errors::IngestError;

/// Default pause between attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(3000);

/// Default number of attempts before a batch is given up on.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 10;

/// What happens to documents that still fail after the last attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailedDocumentPolicy {
    /// Republish the failed records to the error topic.
    #[default]
    RouteToErrorTopic,
    /// Only log them. A request that fails as a whole fails the batch.
    ReportOnly,
}

impl FailedDocumentPolicy {
    /// Parse a policy name. Valid values: "route-to-error-topic" or
    /// "report-only" (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "route-to-error-topic" | "route_to_error_topic" | "route" => {
                Some(Self::RouteToErrorTopic)
            }
            "report-only" | "report_only" | "report" => Some(Self::ReportOnly),
            _ => None,
        }
    }
}

/// Configuration for the index loader.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub retry_interval: Duration,
    /// Total attempts per batch, at least one.
    pub failure_threshold: u32,
    pub policy: FailedDocumentPolicy,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            retry_interval: DEFAULT_RETRY_INTERVAL,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            policy: FailedDocumentPolicy::default(),
        }
    }
}

/// Result of indexing one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    /// Documents the index accepted.
    pub indexed: usize,
    /// Ids of documents that were not indexed.
    pub failed_ids: HashSet<String>,
}

impl IndexReport {
    pub fn is_failed(&self, document_id: &str) -> bool {
        self.failed_ids.contains(document_id)
    }

    pub fn failed_count(&self) -> usize {
        self.failed_ids.len()
    }
}

/// Loader that indexes documents into the search engine.
///
/// The loader is responsible for:
/// - Buffering a batch of bulk items
/// - Retrying failed bulk requests byte for byte
/// - Deciding which documents count as failed once retries are exhausted
pub struct IndexLoader {
    client: SearchBulkClient,
    config: LoaderConfig,
}

impl IndexLoader {
    /// Create a new index loader with the default configuration.
    pub fn new(client: SearchBulkClient) -> Self {
        Self::with_config(client, LoaderConfig::default())
    }

    /// Create a new index loader with custom configuration.
    pub fn with_config(client: SearchBulkClient, config: LoaderConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Index a batch of items.
    ///
    /// Items that can't be added to the request are reported as failed
    /// right away. The buffer is empty again when this returns.
    ///
    /// # Errors
    ///
    /// Only under [`FailedDocumentPolicy::ReportOnly`], when the request as a
    /// whole keeps failing.
    #[instrument(skip(self, items), fields(item_count = items.len()))]
    pub async fn index(&mut self, items: Vec<BulkItem>) -> Result<IndexReport, IngestError> {
        let mut rejected = HashSet::new();
        for item in items {
            let document_id = item.document_id().to_string();
            if let Err(e) = self.client.add(item) {
                error!(document_id = %document_id, error = %e, "Failed to add document to bulk request");
                rejected.insert(document_id);
            }
        }

        let mut report = self.flush_with_retry().await?;
        report.failed_ids.extend(rejected);
        Ok(report)
    }

    async fn flush_with_retry(&mut self) -> Result<IndexReport, IngestError> {
        let threshold = self.config.failure_threshold.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match self.client.flush().await {
                Ok(outcome) => {
                    debug!(indexed = outcome.indexed_count(), attempt, "Bulk request indexed");
                    return Ok(IndexReport {
                        indexed: outcome.indexed_count(),
                        failed_ids: HashSet::new(),
                    });
                }
                Err(err) => err,
            };

            if attempt >= threshold {
                return self.give_up(err, attempt);
            }

            warn!(
                attempt,
                failure_threshold = threshold,
                failed_documents = err.failed_ids().len(),
                error = %err,
                "Bulk request failed, retrying"
            );
            sleep(self.config.retry_interval).await;
        }
    }

    fn give_up(&mut self, err: BulkFlushError, attempts: u32) -> Result<IndexReport, IngestError> {
        let pending = self.client.pending_ids();
        self.client.reset();

        error!(
            attempts,
            pending_documents = pending.len(),
            error = %err,
            "Bulk request failed after retries"
        );

        match err {
            BulkFlushError::PartialFailure { failed_ids } => {
                let failed_ids: HashSet<String> = failed_ids.into_iter().collect();
                let indexed = pending.iter().filter(|id| !failed_ids.contains(*id)).count();
                Ok(IndexReport { indexed, failed_ids })
            }
            BulkFlushError::Request(e) => match self.config.policy {
                FailedDocumentPolicy::RouteToErrorTopic => Ok(IndexReport {
                    indexed: 0,
                    failed_ids: pending.into_iter().collect(),
                }),
                FailedDocumentPolicy::ReportOnly => Err(e.into()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pipeline_repository::{BulkHttpResponse, BulkTransport, SearchIndexError};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct ScriptedTransport {
        responses: Mutex<VecDeque<BulkHttpResponse>>,
        bodies: Mutex<Vec<Vec<u8>>>,
    }

    impl ScriptedTransport {
        fn with(responses: Vec<BulkHttpResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                bodies: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> usize {
            self.bodies.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl BulkTransport for ScriptedTransport {
        async fn send_bulk(&self, body: Vec<u8>) -> Result<BulkHttpResponse, SearchIndexError> {
            self.bodies.lock().unwrap().push(body);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| SearchIndexError::connection("no scripted response"))
        }
    }

    fn ok_response(statuses: &[u16]) -> BulkHttpResponse {
        let items: Vec<String> = statuses
            .iter()
            .map(|status| {
                if *status <= 201 {
                    format!(r#"{{"index":{{"status":{}}}}}"#, status)
                } else {
                    format!(
                        r#"{{"index":{{"status":{},"error":{{"type":"mapper_parsing_exception","reason":"bad"}}}}}}"#,
                        status
                    )
                }
            })
            .collect();
        let errors = statuses.iter().any(|s| *s > 201);
        let body = format!(r#"{{"errors":{},"items":[{}]}}"#, errors, items.join(","));
        BulkHttpResponse::new(200, body.into_bytes())
    }

    fn unavailable() -> BulkHttpResponse {
        BulkHttpResponse::new(503, b"unavailable".to_vec())
    }

    fn items(ids: &[&str]) -> Vec<BulkItem> {
        ids.iter()
            .map(|id| BulkItem::index("mdl-nginx", *id, br#"{"a":1}"#.to_vec()))
            .collect()
    }

    fn loader(transport: Arc<ScriptedTransport>, threshold: u32, policy: FailedDocumentPolicy) -> IndexLoader {
        IndexLoader::with_config(
            SearchBulkClient::new(transport),
            LoaderConfig {
                retry_interval: Duration::from_millis(10),
                failure_threshold: threshold,
                policy,
            },
        )
    }

    #[tokio::test]
    async fn test_successful_batch() {
        let transport = ScriptedTransport::with(vec![ok_response(&[201, 201])]);
        let mut loader = loader(transport.clone(), 3, FailedDocumentPolicy::RouteToErrorTopic);

        let report = loader.index(items(&["a", "b"])).await.unwrap();

        assert_eq!(report.indexed, 2);
        assert!(report.failed_ids.is_empty());
        assert_eq!(transport.requests(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_resends_identical_body() {
        let transport = ScriptedTransport::with(vec![unavailable(), ok_response(&[201, 200])]);
        let mut loader = loader(transport.clone(), 3, FailedDocumentPolicy::RouteToErrorTopic);

        let report = loader.index(items(&["a", "b"])).await.unwrap();

        assert_eq!(report.indexed, 2);
        let bodies = transport.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0], bodies[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_failure_after_threshold_reports_failed_ids() {
        let transport = ScriptedTransport::with(vec![
            ok_response(&[201, 400, 201]),
            ok_response(&[201, 400, 201]),
        ]);
        let mut loader = loader(transport.clone(), 2, FailedDocumentPolicy::RouteToErrorTopic);

        let report = loader.index(items(&["a", "b", "c"])).await.unwrap();

        assert_eq!(report.indexed, 2);
        assert!(report.is_failed("b"));
        assert_eq!(report.failed_count(), 1);
        assert_eq!(transport.requests(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_failure_routes_every_pending_id() {
        let transport = ScriptedTransport::with(vec![unavailable(), unavailable()]);
        let mut loader = loader(transport.clone(), 2, FailedDocumentPolicy::RouteToErrorTopic);

        let report = loader.index(items(&["a", "b"])).await.unwrap();

        assert_eq!(report.indexed, 0);
        assert!(report.is_failed("a"));
        assert!(report.is_failed("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_failure_under_report_only_is_an_error() {
        let transport = ScriptedTransport::with(vec![unavailable()]);
        let mut loader = loader(transport.clone(), 1, FailedDocumentPolicy::ReportOnly);

        let result = loader.index(items(&["a"])).await;

        assert!(matches!(result, Err(IngestError::IndexError(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffer_is_reset_after_giving_up() {
        let transport = ScriptedTransport::with(vec![unavailable(), ok_response(&[201])]);
        let mut loader = loader(transport.clone(), 1, FailedDocumentPolicy::RouteToErrorTopic);

        let first = loader.index(items(&["a"])).await.unwrap();
        assert!(first.is_failed("a"));

        let second = loader.index(items(&["b"])).await.unwrap();
        assert_eq!(second.indexed, 1);
        assert!(second.failed_ids.is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch_sends_nothing() {
        let transport = ScriptedTransport::with(vec![]);
        let mut loader = loader(transport.clone(), 1, FailedDocumentPolicy::RouteToErrorTopic);

        let report = loader.index(Vec::new()).await.unwrap();

        assert_eq!(report, IndexReport::default());
        assert_eq!(transport.requests(), 0);
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!(
            FailedDocumentPolicy::parse("Report-Only"),
            Some(FailedDocumentPolicy::ReportOnly)
        );
        assert_eq!(
            FailedDocumentPolicy::parse("route-to-error-topic"),
            Some(FailedDocumentPolicy::RouteToErrorTopic)
        );
        assert_eq!(FailedDocumentPolicy::parse("drop"), None);
    }
}
