//! Bulk transport trait definition.
//!
//! This module defines the abstract interface for sending a bulk request,
//! allowing for different backend implementations (OpenSearch, Elasticsearch, etc.).

use async_trait::async_trait;

use crate::errors::SearchIndexError;

/// Raw answer to a bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkHttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body as returned by the engine.
    pub body: Vec<u8>,
}

impl BulkHttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Abstracts the underlying search engine a bulk request is sent to.
///
/// Implementations are injected into `SearchBulkClient` to enable dependency
/// injection and easy testing with mock implementations. The transport knows
/// nothing about items or per-document results; it ships bytes and returns
/// the status and body verbatim.
#[async_trait]
pub trait BulkTransport: Send + Sync {
    /// Send one bulk request.
    ///
    /// # Arguments
    ///
    /// * `body` - Complete NDJSON body, ending with a newline
    ///
    /// # Returns
    ///
    /// * `Ok(BulkHttpResponse)` - The engine answered, whatever the status
    /// * `Err(SearchIndexError)` - The request could not be sent or its
    ///   response could not be read
    async fn send_bulk(&self, body: Vec<u8>) -> Result<BulkHttpResponse, SearchIndexError>;
}
