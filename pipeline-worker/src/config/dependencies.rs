//! Dependency initialization and wiring for the pipeline worker.

use pipeline_kafka::{
    create_consumer, delivery_channel, KafkaOffsetTracker, KafkaTxnProducer, PublisherConfig,
    TransactionalPublisher,
};
use pipeline_repository::{BulkClientConfig, OpenSearchBulkTransport, SearchBulkClient};
use pipeline_shared::PipelineConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::collaborators::{
    IndexBaseRegistry, PipelineConfigSource, StaticIndexBaseRegistry, StaticPipelineSource,
};
use crate::config::settings::{ConnectionMode, WorkerSettings};
use crate::consumer::KafkaConsumer;
use crate::loader::IndexLoader;
use crate::orchestrator::PipelineOrchestrator;
use crate::processor::RecordProcessor;
use crate::IndexingError;

/// Orchestrator wired to Kafka and OpenSearch.
pub type WorkerOrchestrator = PipelineOrchestrator<KafkaConsumer, KafkaTxnProducer, KafkaOffsetTracker>;

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// The configured orchestrator ready to run.
    pub orchestrator: WorkerOrchestrator,
    /// Pipeline the orchestrator runs.
    pub pipeline: PipelineConfig,
    /// Transactional id of the producer, fenced on every restart.
    pub transactional_id: String,
}

impl Dependencies {
    /// Initialize all dependencies from environment variables.
    ///
    /// See [`WorkerSettings::from_env`] for the variables read.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(IndexingError)` - If initialization fails (OpenSearch only in fail-fast mode)
    pub async fn new() -> Result<Self, IndexingError> {
        let settings = WorkerSettings::from_env()?;
        let pipelines = StaticPipelineSource::new([settings.pipeline_config()]);
        let index_bases = StaticIndexBaseRegistry::new([settings.index_base.clone()]);
        Self::from_settings(&settings, &pipelines, &index_bases).await
    }

    /// Build every component for the pipeline named in `settings`.
    pub async fn from_settings(
        settings: &WorkerSettings,
        pipelines: &dyn PipelineConfigSource,
        index_bases: &dyn IndexBaseRegistry,
    ) -> Result<Self, IndexingError> {
        let pipeline = pipelines.pipeline(&settings.pipeline_id).await?;
        let index_base = index_bases.resolve(&settings.index_base.base_type).await?;

        info!(
            pipeline_id = %pipeline.pipeline_id,
            input_topic = %pipeline.input_topic,
            output_topic = %pipeline.output_topic,
            error_topic = %pipeline.error_topic,
            index_alias = %index_base.index_alias(),
            opensearch_url = %settings.opensearch_url,
            kafka_broker = %settings.kafka.broker,
            connection_mode = ?settings.connection_mode,
            "Initializing dependencies"
        );

        // Exits in fail-fast mode, otherwise waits for OpenSearch to come up
        let transport = Self::connect_to_opensearch(
            &settings.opensearch_url,
            settings.connection_mode,
            settings.connect_retry_interval,
        )
        .await?;

        info!("OpenSearch connection established");

        let group_id = pipeline.consumer_group_id();
        let consumer = create_consumer(&settings.kafka, &group_id, &[pipeline.input_topic.as_str()])
            .map_err(|e| IndexingError::config(format!("Failed to create Kafka consumer: {}", e)))?;
        let consumer = KafkaConsumer::new(Arc::new(consumer));
        let offsets = KafkaOffsetTracker::new(consumer.inner());

        info!(group_id = %group_id, "Kafka consumer created");

        let (sender, receiver) = delivery_channel(settings.delivery_channel_capacity);
        let transactional_id = pipeline.transactional_id(settings.worker_instance.as_deref());
        let producer = KafkaTxnProducer::new(&settings.kafka, &transactional_id, sender)
            .await
            .map_err(|e| IndexingError::config(format!("Failed to create Kafka producer: {}", e)))?;
        let publisher = TransactionalPublisher::new(
            producer,
            receiver,
            PublisherConfig::new(Duration::from_millis(settings.kafka.transaction_timeout_ms)),
        );

        let client = SearchBulkClient::with_config(
            Arc::new(transport),
            BulkClientConfig::with_buffer_capacity(settings.flush_bytes),
        );
        let loader = IndexLoader::with_config(client, settings.loader_config());
        let processor = RecordProcessor::new(pipeline.clone(), index_base);

        let orchestrator = PipelineOrchestrator::new(
            consumer,
            offsets,
            processor,
            loader,
            publisher,
            settings.orchestrator_config(),
        );

        Ok(Self {
            orchestrator,
            pipeline,
            transactional_id,
        })
    }

    /// Connect to OpenSearch with retry logic based on connection mode.
    async fn connect_to_opensearch(
        url: &str,
        mode: ConnectionMode,
        retry_interval: Duration,
    ) -> Result<OpenSearchBulkTransport, IndexingError> {
        loop {
            match Self::try_connect_opensearch(url).await {
                Ok(transport) => return Ok(transport),
                Err(e) => match mode {
                    ConnectionMode::FailFast => return Err(e),
                    ConnectionMode::Retry => {
                        warn!(
                            opensearch_url = %url,
                            error = %e,
                            retry_interval_secs = retry_interval.as_secs(),
                            "Failed to connect to OpenSearch, retrying..."
                        );
                        sleep(retry_interval).await;
                    }
                },
            }
        }
    }

    /// Attempt to connect to OpenSearch.
    async fn try_connect_opensearch(url: &str) -> Result<OpenSearchBulkTransport, IndexingError> {
        let transport = OpenSearchBulkTransport::new(url).map_err(|e| {
            IndexingError::config(format!("Failed to create OpenSearch transport: {}", e))
        })?;
        transport
            .ping()
            .await
            .map_err(|e| IndexingError::config(format!("Failed to connect to OpenSearch: {}", e)))?;
        Ok(transport)
    }
}
