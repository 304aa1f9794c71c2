//! Pipeline definition types.
//!
//! A pipeline reads one input topic, indexes every record and republishes it
//! to an output topic (or to an error topic when indexing failed).

use serde::{Deserialize, Serialize};

/// Format of the derived output topic: `{tenant}.sdp.output.{base_type}`.
const OUTPUT_TOPIC_FORMAT_PREFIX: &str = "sdp.output";
const ERROR_TOPIC_FORMAT_PREFIX: &str = "sdp.error";

/// Definition of a single pipeline as returned by the pipeline config source.
///
/// # Fields
///
/// - `pipeline_id`: Stable identifier of the pipeline
/// - `tenant`: Tenant the pipeline belongs to, used to namespace groups and topics
/// - `input_topic`: Topic the worker consumes
/// - `output_topic`: Topic that receives a copy of every indexed record
/// - `error_topic`: Topic that receives records whose document failed to index
/// - `use_index_base_in_data`: Take the index base from the record's `__index_base` field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineConfig {
    pub pipeline_id: String,
    pub tenant: String,
    pub input_topic: String,
    pub output_topic: String,
    pub error_topic: String,
    #[serde(default)]
    pub use_index_base_in_data: bool,
}

impl PipelineConfig {
    /// Consumer group used by every worker of this pipeline.
    ///
    /// One pipeline maps to one consumer group, so scaling out workers splits
    /// the input partitions between them.
    pub fn consumer_group_id(&self) -> String {
        format!("{}.sdp.{}", self.tenant, self.pipeline_id)
    }

    /// Transactional id of one worker's producer.
    ///
    /// Stable across restarts of the same logical worker so the broker can
    /// fence a zombie instance and recover its open transaction. Workers
    /// running side by side need distinct `instance` values or they fence
    /// each other.
    pub fn transactional_id(&self, instance: Option<&str>) -> String {
        match instance {
            Some(instance) => format!("{}_{}_{}", self.pipeline_id, self.input_topic, instance),
            None => format!("{}_{}", self.pipeline_id, self.input_topic),
        }
    }

    /// Output topic for records that carry their own index base type.
    pub fn output_topic_for(&self, base_type: &str) -> String {
        output_topic_name(&self.tenant, base_type)
    }
}

/// Build the output topic name for a tenant and index base type.
pub fn output_topic_name(tenant: &str, base_type: &str) -> String {
    format!("{}.{}.{}", tenant, OUTPUT_TOPIC_FORMAT_PREFIX, base_type)
}

/// Build the default error topic name of a pipeline.
pub fn error_topic_name(tenant: &str, pipeline_id: &str) -> String {
    format!("{}.{}.{}", tenant, ERROR_TOPIC_FORMAT_PREFIX, pipeline_id)
}
