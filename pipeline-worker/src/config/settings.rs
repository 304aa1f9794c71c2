//! Worker settings read from the environment.

use pipeline_kafka::KafkaSettings;
use pipeline_shared::{error_topic_name, output_topic_name, DocumentCategory, IndexBaseInfo, PipelineConfig};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::loader::{FailedDocumentPolicy, LoaderConfig};
use crate::orchestrator::{OrchestratorConfig, DEFAULT_POLL_TIMEOUT, DEFAULT_PROGRESS_INTERVAL};
use crate::IndexingError;

/// Default OpenSearch URL.
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";

/// Default connection retry interval in seconds.
const DEFAULT_CONNECT_RETRY_INTERVAL_SECS: u64 = 15;

const DEFAULT_TENANT: &str = "default";
const DEFAULT_INDEX_BASE_TYPE: &str = "default";
const DEFAULT_INDEX_DATA_TYPE: &str = "log";
const DEFAULT_INDEX_CATEGORY: &str = "log";
const DEFAULT_FLUSH_MIB: usize = 5;
const DEFAULT_FLUSH_ITEMS: usize = 10_000;
const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 5;
const DEFAULT_RETRY_INTERVAL_MS: u64 = 3000;
const DEFAULT_FAILURE_THRESHOLD: u32 = 10;

/// Connection mode for OpenSearch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Fail immediately if connection fails.
    FailFast,
    /// Retry connection until successful.
    Retry,
}

impl ConnectionMode {
    /// Valid values: "fail-fast" or "retry" (case-insensitive).
    /// Defaults to "retry" if not set or invalid.
    fn parse(value: Option<&str>) -> Self {
        match value.unwrap_or("retry").to_lowercase().as_str() {
            "fail-fast" | "failfast" | "fail_fast" => Self::FailFast,
            "retry" => Self::Retry,
            _ => {
                warn!("Invalid OPENSEARCH_CONNECTION_MODE, defaulting to 'retry'");
                Self::Retry
            }
        }
    }
}

/// Everything the worker needs to start.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub pipeline_id: String,
    pub tenant: String,
    pub input_topic: String,
    /// Distinguishes workers of the same pipeline in the transactional id.
    pub worker_instance: Option<String>,
    /// Explicit output topic; derived from the index base when unset.
    pub output_topic: Option<String>,
    /// Explicit error topic; derived from the pipeline id when unset.
    pub error_topic: Option<String>,
    pub use_index_base_in_data: bool,
    pub index_base: IndexBaseInfo,
    pub kafka: KafkaSettings,
    pub opensearch_url: String,
    pub connection_mode: ConnectionMode,
    pub connect_retry_interval: Duration,
    pub flush_bytes: usize,
    pub flush_items: usize,
    pub flush_interval: Duration,
    pub retry_interval: Duration,
    pub failure_threshold: u32,
    pub delivery_channel_capacity: usize,
    pub failed_document_policy: FailedDocumentPolicy,
}

impl WorkerSettings {
    /// Read settings from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `PIPELINE_ID`, `INPUT_TOPIC`: required
    /// - `PIPELINE_TENANT`: tenant namespace (default: default)
    /// - `WORKER_INSTANCE`: per-worker suffix of the transactional id; set it to
    ///   a stable, distinct value on every worker of a scaled-out pipeline
    /// - `OUTPUT_TOPIC`, `ERROR_TOPIC`: derived when unset
    /// - `INDEX_BASE_TYPE`, `INDEX_BASE_NAME`, `INDEX_DATA_TYPE`, `INDEX_CATEGORY`
    /// - `USE_INDEX_BASE_IN_DATA`: take the index base from each record
    /// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
    /// - `OPENSEARCH_CONNECTION_MODE`: "fail-fast" or "retry" (default: retry)
    /// - `OPENSEARCH_RETRY_INTERVAL_SECS`: connect retry interval (default: 15)
    /// - `FLUSH_MIB`, `FLUSH_ITEMS`, `FLUSH_INTERVAL_SECS`: batch limits
    /// - `RETRY_INTERVAL_MS`, `FAILURE_THRESHOLD`: retry policy
    /// - `DELIVERY_CHANNEL_CAPACITY`: unconfirmed sends (default: `FLUSH_ITEMS`)
    /// - `FAILED_DOCUMENT_POLICY`: "route-to-error-topic" or "report-only"
    /// - `KAFKA_*`: see [`KafkaSettings::from_env`]
    pub fn from_env() -> Result<Self, IndexingError> {
        let kafka = KafkaSettings::from_env()
            .map_err(|e| IndexingError::config(format!("Invalid Kafka settings: {}", e)))?;
        Self::from_lookup(|key| env::var(key).ok(), kafka)
    }

    /// Read settings through `lookup`, with Kafka settings already resolved.
    pub fn from_lookup<F>(lookup: F, kafka: KafkaSettings) -> Result<Self, IndexingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            var(key).ok_or_else(|| IndexingError::config(format!("{} is required", key)))
        };
        let parsed = |key: &str| -> Result<Option<u64>, IndexingError> { parse_var(var(key), key) };

        let base_type = var("INDEX_BASE_TYPE").unwrap_or_else(|| DEFAULT_INDEX_BASE_TYPE.to_string());
        let index_base = IndexBaseInfo {
            name: var("INDEX_BASE_NAME").unwrap_or_else(|| base_type.clone()),
            data_type: var("INDEX_DATA_TYPE").unwrap_or_else(|| DEFAULT_INDEX_DATA_TYPE.to_string()),
            category: DocumentCategory::parse(
                &var("INDEX_CATEGORY").unwrap_or_else(|| DEFAULT_INDEX_CATEGORY.to_string()),
            ),
            base_type,
        };

        let flush_items = parsed("FLUSH_ITEMS")?
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_FLUSH_ITEMS);

        let failed_document_policy = match var("FAILED_DOCUMENT_POLICY") {
            None => FailedDocumentPolicy::default(),
            Some(raw) => FailedDocumentPolicy::parse(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "Invalid FAILED_DOCUMENT_POLICY, defaulting to 'route-to-error-topic'");
                FailedDocumentPolicy::default()
            }),
        };

        Ok(Self {
            pipeline_id: required("PIPELINE_ID")?,
            tenant: var("PIPELINE_TENANT").unwrap_or_else(|| DEFAULT_TENANT.to_string()),
            input_topic: required("INPUT_TOPIC")?,
            worker_instance: var("WORKER_INSTANCE"),
            output_topic: var("OUTPUT_TOPIC"),
            error_topic: var("ERROR_TOPIC"),
            use_index_base_in_data: parse_var::<bool>(var("USE_INDEX_BASE_IN_DATA"), "USE_INDEX_BASE_IN_DATA")?
                .unwrap_or(false),
            index_base,
            kafka,
            opensearch_url: var("OPENSEARCH_URL").unwrap_or_else(|| DEFAULT_OPENSEARCH_URL.to_string()),
            connection_mode: ConnectionMode::parse(var("OPENSEARCH_CONNECTION_MODE").as_deref()),
            connect_retry_interval: Duration::from_secs(
                parsed("OPENSEARCH_RETRY_INTERVAL_SECS")?.unwrap_or(DEFAULT_CONNECT_RETRY_INTERVAL_SECS),
            ),
            flush_bytes: parsed("FLUSH_MIB")?
                .map(|n| n as usize)
                .unwrap_or(DEFAULT_FLUSH_MIB)
                * 1024
                * 1024,
            flush_items,
            flush_interval: Duration::from_secs(
                parsed("FLUSH_INTERVAL_SECS")?.unwrap_or(DEFAULT_FLUSH_INTERVAL_SECS),
            ),
            retry_interval: Duration::from_millis(
                parsed("RETRY_INTERVAL_MS")?.unwrap_or(DEFAULT_RETRY_INTERVAL_MS),
            ),
            failure_threshold: parse_var::<u32>(var("FAILURE_THRESHOLD"), "FAILURE_THRESHOLD")?
                .unwrap_or(DEFAULT_FAILURE_THRESHOLD),
            delivery_channel_capacity: parsed("DELIVERY_CHANNEL_CAPACITY")?
                .map(|n| n as usize)
                .unwrap_or(flush_items),
            failed_document_policy,
        })
    }

    /// Pipeline definition served by the env-backed config source.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            pipeline_id: self.pipeline_id.clone(),
            tenant: self.tenant.clone(),
            input_topic: self.input_topic.clone(),
            output_topic: self
                .output_topic
                .clone()
                .unwrap_or_else(|| output_topic_name(&self.tenant, &self.index_base.base_type)),
            error_topic: self
                .error_topic
                .clone()
                .unwrap_or_else(|| error_topic_name(&self.tenant, &self.pipeline_id)),
            use_index_base_in_data: self.use_index_base_in_data,
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            flush_bytes: self.flush_bytes,
            flush_items: self.flush_items,
            flush_interval: self.flush_interval,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            retry_interval: self.retry_interval,
            failure_threshold: self.failure_threshold,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            retry_interval: self.retry_interval,
            failure_threshold: self.failure_threshold,
            policy: self.failed_document_policy,
        }
    }
}

fn parse_var<T: FromStr>(raw: Option<String>, key: &str) -> Result<Option<T>, IndexingError>
where
    T::Err: std::fmt::Display,
{
    raw.map(|raw| {
        raw.trim()
            .parse()
            .map_err(|e| IndexingError::config(format!("{}={:?}: {}", key, raw, e)))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<WorkerSettings, IndexingError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerSettings::from_lookup(|key| vars.get(key).cloned(), KafkaSettings::default())
    }

    const REQUIRED: [(&str, &str); 2] = [("PIPELINE_ID", "p-1"), ("INPUT_TOPIC", "acme.raw")];

    #[test]
    fn test_defaults() {
        let settings = settings(&REQUIRED).unwrap();

        assert_eq!(settings.tenant, "default");
        assert_eq!(settings.flush_bytes, 5 * 1024 * 1024);
        assert_eq!(settings.flush_items, 10_000);
        assert_eq!(settings.flush_interval, Duration::from_secs(5));
        assert_eq!(settings.retry_interval, Duration::from_millis(3000));
        assert_eq!(settings.failure_threshold, 10);
        assert_eq!(settings.delivery_channel_capacity, 10_000);
        assert_eq!(settings.connection_mode, ConnectionMode::Retry);
        assert_eq!(
            settings.failed_document_policy,
            FailedDocumentPolicy::RouteToErrorTopic
        );
        assert_eq!(settings.index_base.base_type, "default");
        assert_eq!(settings.index_base.category, DocumentCategory::Log);
    }

    #[test]
    fn test_missing_pipeline_id_is_an_error() {
        let result = settings(&[("INPUT_TOPIC", "acme.raw")]);
        assert!(matches!(result, Err(IndexingError::ConfigError(_))));
    }

    #[test]
    fn test_invalid_number_is_an_error() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("FLUSH_ITEMS", "many"));
        assert!(settings(&vars).is_err());
    }

    #[test]
    fn test_unknown_policy_falls_back() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("FAILED_DOCUMENT_POLICY", "drop-everything"));
        let settings = settings(&vars).unwrap();
        assert_eq!(
            settings.failed_document_policy,
            FailedDocumentPolicy::RouteToErrorTopic
        );
    }

    #[test]
    fn test_channel_capacity_follows_flush_items() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("FLUSH_ITEMS", "250"));
        assert_eq!(settings(&vars).unwrap().delivery_channel_capacity, 250);
    }

    #[test]
    fn test_derived_pipeline_config() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("PIPELINE_TENANT", "acme"),
            ("INDEX_BASE_TYPE", "nginx"),
            ("USE_INDEX_BASE_IN_DATA", "true"),
        ]);
        let pipeline = settings(&vars).unwrap().pipeline_config();

        assert_eq!(pipeline.output_topic, "acme.sdp.output.nginx");
        assert_eq!(pipeline.error_topic, "acme.sdp.error.p-1");
        assert!(pipeline.use_index_base_in_data);
        assert_eq!(pipeline.consumer_group_id(), "acme.sdp.p-1");
    }

    #[test]
    fn test_worker_instance_is_optional() {
        assert_eq!(settings(&REQUIRED).unwrap().worker_instance, None);

        let mut vars = REQUIRED.to_vec();
        vars.push(("WORKER_INSTANCE", "2"));
        assert_eq!(settings(&vars).unwrap().worker_instance.as_deref(), Some("2"));
    }

    #[test]
    fn test_explicit_topics_win() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([("OUTPUT_TOPIC", "out"), ("ERROR_TOPIC", "err")]);
        let pipeline = settings(&vars).unwrap().pipeline_config();

        assert_eq!(pipeline.output_topic, "out");
        assert_eq!(pipeline.error_topic, "err");
    }
}
