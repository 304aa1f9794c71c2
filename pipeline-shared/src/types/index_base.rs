//! Index base types.
//!
//! An index base is the logical destination of a pipeline's documents. Every
//! base type is written through the `mdl-{base_type}` alias.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix of every index alias written by the pipeline.
pub const INDEX_ALIAS_PREFIX: &str = "mdl";

/// Category of the documents stored in an index base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentCategory {
    Log,
    Metric,
    Trace,
    #[serde(untagged)]
    Other(String),
}

impl DocumentCategory {
    /// Parse a category name. Unknown names are kept verbatim.
    pub fn parse(value: &str) -> Self {
        match value {
            "log" => Self::Log,
            "metric" => Self::Metric,
            "trace" => Self::Trace,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Log => "log",
            Self::Metric => "metric",
            Self::Trace => "trace",
            Self::Other(other) => other.as_str(),
        }
    }
}

impl fmt::Display for DocumentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Index base as resolved by the index base registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexBaseInfo {
    /// Display name of the index base.
    pub name: String,
    /// Logical type, used in the index alias and the output topic name.
    pub base_type: String,
    /// Default `__data_type` for documents that don't carry one.
    pub data_type: String,
    /// Default `__category` for documents that don't carry one.
    pub category: DocumentCategory,
}

impl IndexBaseInfo {
    /// Alias documents of this index base are written to.
    pub fn index_alias(&self) -> String {
        index_alias(&self.base_type)
    }
}

/// Alias for an arbitrary base type.
pub fn index_alias(base_type: &str) -> String {
    format!("{}-{}", INDEX_ALIAS_PREFIX, base_type)
}
