//! Record processor implementation.
//!
//! Transforms input records into bulk index items for the pipeline's index
//! base, and keeps what is needed to republish each record afterwards.

use pipeline_kafka::{InboundRecord, OutboundRecord};
use pipeline_repository::BulkItem;
use pipeline_shared::{index_alias, DocumentCategory, IndexBaseInfo, PipelineConfig};
use tracing::{debug, instrument};

use crate::processor::document::{
    Document, FIELD_DATA_TYPE, FIELD_ID, FIELD_INDEX_BASE, FIELD_PIPELINE_ID, FIELD_WRITE_TIME,
};

/// Header carrying the pipeline id on every republished record.
pub const PIPELINE_ID_HEADER: &str = "__pipeline_id";

/// What is republished for one record once its document is indexed or has
/// failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordCopy {
    pub document_id: String,
    pub key: Option<Vec<u8>>,
    /// The payload as consumed, or its `{"message": ..}` wrapping.
    pub payload: Vec<u8>,
    pub output_topic: String,
}

impl RecordCopy {
    /// Copy for the output topic.
    pub fn to_output(&self, pipeline_id: &str) -> OutboundRecord {
        self.to_topic(&self.output_topic, pipeline_id)
    }

    /// Copy for the error topic.
    pub fn to_error(&self, error_topic: &str, pipeline_id: &str) -> OutboundRecord {
        self.to_topic(error_topic, pipeline_id)
    }

    fn to_topic(&self, topic: &str, pipeline_id: &str) -> OutboundRecord {
        let record = OutboundRecord::new(topic, self.payload.clone())
            .with_header(PIPELINE_ID_HEADER, pipeline_id.as_bytes().to_vec());
        match &self.key {
            Some(key) => record.with_key(key.clone()),
            None => record,
        }
    }
}

/// A record ready to be indexed.
pub struct ProcessedRecord {
    pub item: BulkItem,
    pub copy: RecordCopy,
}

/// Processor that turns records into search documents.
///
/// The processor is responsible for:
/// - Wrapping payloads that are not JSON objects
/// - Filling the pipeline, index base, category and time fields
/// - Deriving metric series ids and routing keys for metrics and traces
/// - Choosing the document id and the target alias
pub struct RecordProcessor {
    pipeline: PipelineConfig,
    index_base: IndexBaseInfo,
}

impl RecordProcessor {
    /// Create a processor for one pipeline and its index base.
    pub fn new(pipeline: PipelineConfig, index_base: IndexBaseInfo) -> Self {
        Self {
            pipeline,
            index_base,
        }
    }

    pub fn pipeline(&self) -> &PipelineConfig {
        &self.pipeline
    }

    /// Process a batch of records.
    ///
    /// Records without a payload produce nothing; their offsets are still
    /// committed with the batch.
    #[instrument(skip(self, records), fields(record_count = records.len()))]
    pub fn process_batch(&self, records: &[InboundRecord]) -> Vec<ProcessedRecord> {
        let processed: Vec<ProcessedRecord> =
            records.iter().filter_map(|r| self.process(r)).collect();

        debug!(
            input_count = records.len(),
            output_count = processed.len(),
            "Processed batch"
        );
        processed
    }

    /// Process a single record.
    pub fn process(&self, record: &InboundRecord) -> Option<ProcessedRecord> {
        let Some(payload) = record.payload.as_deref() else {
            debug!(
                partition = record.partition,
                offset = record.offset,
                "Skipping record without payload"
            );
            return None;
        };

        let enriched = self.enrich(record, payload);
        let mut item = BulkItem::index(
            enriched.alias,
            enriched.document_id.as_str(),
            enriched.document.to_vec(),
        )
        .with_require_alias(true);
        if let Some(routing) = enriched.routing {
            item = item.with_routing(routing);
        }

        Some(ProcessedRecord {
            item,
            copy: RecordCopy {
                document_id: enriched.document_id,
                key: record.key.clone(),
                payload: enriched.payload,
                output_topic: enriched.output_topic,
            },
        })
    }

    fn enrich(&self, record: &InboundRecord, payload: &[u8]) -> Enriched {
        let (mut document, payload) = Document::from_payload(payload);
        document.set(FIELD_PIPELINE_ID, self.pipeline.pipeline_id.as_str());

        let base_type = document.str_or_insert(FIELD_INDEX_BASE, &self.index_base.base_type);
        let (alias, output_topic) = if self.pipeline.use_index_base_in_data {
            (index_alias(&base_type), self.pipeline.output_topic_for(&base_type))
        } else {
            (
                self.index_base.index_alias(),
                self.pipeline.output_topic.clone(),
            )
        };

        document.str_or_insert(FIELD_DATA_TYPE, &self.index_base.data_type);

        let write_time = record
            .timestamp_ms
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
        document.set(FIELD_WRITE_TIME, write_time);
        document.normalize_timestamp(write_time);

        let category = document.resolve_category(self.index_base.category.as_str());
        let routing = match DocumentCategory::parse(&category) {
            DocumentCategory::Metric => document.apply_metric_routing(),
            DocumentCategory::Trace => document.apply_trace_routing(),
            _ => None,
        };

        let document_id = match document.str_field(FIELD_ID) {
            Some(id) => id.to_string(),
            None => {
                let id = format!(
                    "{}[{}]@{}-{}",
                    base_type, record.partition, record.offset, write_time
                );
                document.set(FIELD_ID, id.as_str());
                id
            }
        };

        Enriched {
            document,
            document_id,
            alias,
            routing,
            output_topic,
            payload,
        }
    }
}

struct Enriched {
    document: Document,
    document_id: String,
    alias: String,
    routing: Option<String>,
    output_topic: String,
    payload: Vec<u8>,
}

impl std::fmt::Debug for ProcessedRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessedRecord")
            .field("document_id", &self.copy.document_id)
            .field("index", &self.item.index_name())
            .field("routing", &self.item.routing())
            .finish()
    }
}
