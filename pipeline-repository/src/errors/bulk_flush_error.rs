//! Bulk flush error types.

use thiserror::Error;

use super::SearchIndexError;

/// Errors returned by [`SearchBulkClient::flush`](crate::SearchBulkClient::flush).
///
/// In both cases the pending buffer is left exactly as it was before the
/// flush, so the caller can retry the same batch or give up on it.
#[derive(Debug, Clone, Error)]
pub enum BulkFlushError {
    /// The bulk request failed as a whole: the engine was unreachable,
    /// answered with a non-2xx status, or returned a body we could not read.
    /// No per-document information is available.
    #[error("Bulk request failed: {0}")]
    Request(#[source] SearchIndexError),

    /// The request went through but some documents were rejected.
    #[error("Bulk flush had {} failed documents", failed_ids.len())]
    PartialFailure { failed_ids: Vec<String> },
}

impl BulkFlushError {
    /// Document IDs rejected by the engine. Empty for hard failures.
    pub fn failed_ids(&self) -> &[String] {
        match self {
            Self::Request(_) => &[],
            Self::PartialFailure { failed_ids } => failed_ids,
        }
    }

    /// Whether the whole request failed without per-document detail.
    pub fn is_hard_failure(&self) -> bool {
        matches!(self, Self::Request(_))
    }
}

impl From<SearchIndexError> for BulkFlushError {
    fn from(err: SearchIndexError) -> Self {
        Self::Request(err)
    }
}
