//! Lookups consulted once before the ingest loop starts.
//!
//! The pipeline definition and the index base normally come from external
//! services. The implementations here serve them from worker settings.

use async_trait::async_trait;
use pipeline_shared::{IndexBaseInfo, PipelineConfig};
use std::collections::HashMap;

use crate::errors::IngestError;

/// Source of pipeline definitions.
#[async_trait]
pub trait PipelineConfigSource: Send + Sync {
    async fn pipeline(&self, pipeline_id: &str) -> Result<PipelineConfig, IngestError>;
}

/// Resolves index bases by their logical type.
#[async_trait]
pub trait IndexBaseRegistry: Send + Sync {
    async fn resolve(&self, base_type: &str) -> Result<IndexBaseInfo, IngestError>;
}

/// Pipeline definitions known up front.
#[derive(Debug, Default, Clone)]
pub struct StaticPipelineSource {
    pipelines: HashMap<String, PipelineConfig>,
}

impl StaticPipelineSource {
    pub fn new(pipelines: impl IntoIterator<Item = PipelineConfig>) -> Self {
        Self {
            pipelines: pipelines
                .into_iter()
                .map(|p| (p.pipeline_id.clone(), p))
                .collect(),
        }
    }
}

#[async_trait]
impl PipelineConfigSource for StaticPipelineSource {
    async fn pipeline(&self, pipeline_id: &str) -> Result<PipelineConfig, IngestError> {
        self.pipelines
            .get(pipeline_id)
            .cloned()
            .ok_or_else(|| IngestError::lookup(format!("unknown pipeline {}", pipeline_id)))
    }
}

/// Index bases known up front.
#[derive(Debug, Default, Clone)]
pub struct StaticIndexBaseRegistry {
    bases: HashMap<String, IndexBaseInfo>,
}

impl StaticIndexBaseRegistry {
    pub fn new(bases: impl IntoIterator<Item = IndexBaseInfo>) -> Self {
        Self {
            bases: bases
                .into_iter()
                .map(|b| (b.base_type.clone(), b))
                .collect(),
        }
    }
}

#[async_trait]
impl IndexBaseRegistry for StaticIndexBaseRegistry {
    async fn resolve(&self, base_type: &str) -> Result<IndexBaseInfo, IngestError> {
        self.bases
            .get(base_type)
            .cloned()
            .ok_or_else(|| IngestError::lookup(format!("unknown index base {}", base_type)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_shared::DocumentCategory;

    #[tokio::test]
    async fn test_static_lookups() {
        let pipelines = StaticPipelineSource::new([PipelineConfig {
            pipeline_id: "p-1".to_string(),
            tenant: "acme".to_string(),
            input_topic: "in".to_string(),
            output_topic: "out".to_string(),
            error_topic: "err".to_string(),
            use_index_base_in_data: false,
        }]);
        let bases = StaticIndexBaseRegistry::new([IndexBaseInfo {
            name: "Nginx".to_string(),
            base_type: "nginx".to_string(),
            data_type: "log".to_string(),
            category: DocumentCategory::Log,
        }]);

        assert_eq!(pipelines.pipeline("p-1").await.unwrap().input_topic, "in");
        assert!(matches!(
            pipelines.pipeline("p-2").await,
            Err(IngestError::LookupError(_))
        ));
        assert_eq!(bases.resolve("nginx").await.unwrap().name, "Nginx");
        assert!(bases.resolve("haproxy").await.is_err());
    }
}
