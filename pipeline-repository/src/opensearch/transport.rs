//! OpenSearch bulk transport implementation.
//!
//! This module provides the concrete implementation of `BulkTransport`
//! using the OpenSearch Rust crate.

use async_trait::async_trait;
use opensearch::{
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    BulkParts, OpenSearch,
};
use tracing::{debug, error, info};
use url::Url;

use crate::errors::SearchIndexError;
use crate::interfaces::{BulkHttpResponse, BulkTransport};

/// OpenSearch bulk transport.
///
/// Sends pre-built NDJSON bodies to the `_bulk` endpoint of a single node.
///
/// # Example
///
/// ```ignore
/// use pipeline_repository::{OpenSearchBulkTransport, SearchBulkClient};
/// use std::sync::Arc;
///
/// let transport = OpenSearchBulkTransport::new("http://localhost:9200")?;
/// let client = SearchBulkClient::new(Arc::new(transport));
/// ```
pub struct OpenSearchBulkTransport {
    client: OpenSearch,
}

impl OpenSearchBulkTransport {
    /// Create a new transport connected to the specified URL.
    ///
    /// # Arguments
    ///
    /// * `url` - The OpenSearch server URL (e.g., "http://localhost:9200")
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchBulkTransport)` - A new transport instance
    /// * `Err(SearchIndexError)` - If connection setup fails
    pub fn new(url: &str) -> Result<Self, SearchIndexError> {
        let parsed_url =
            Url::parse(url).map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        info!(url = %url, "Created OpenSearch bulk transport");

        Ok(Self {
            client: OpenSearch::new(transport),
        })
    }

    /// Check that the cluster answers at all.
    ///
    /// Used at startup so a misconfigured URL surfaces before the first batch.
    pub async fn ping(&self) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .ping()
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            return Err(SearchIndexError::connection(format!(
                "Ping failed with status {}",
                status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl BulkTransport for OpenSearchBulkTransport {
    async fn send_bulk(&self, mut body: Vec<u8>) -> Result<BulkHttpResponse, SearchIndexError> {
        // The NDJSON body writer terminates every line itself.
        if body.last() == Some(&b'\n') {
            body.pop();
        }
        let size = body.len();

        let response = self
            .client
            .bulk(BulkParts::None)
            .body(vec![body])
            .send()
            .await
            .map_err(|e| SearchIndexError::request(e.to_string()))?;

        let status = response.status_code().as_u16();
        let text = response.text().await.map_err(|e| {
            error!(status, error = %e, "Failed to read bulk response body");
            SearchIndexError::request(e.to_string())
        })?;

        debug!(status, request_bytes = size, "Bulk request completed");
        Ok(BulkHttpResponse::new(status, text.into_bytes()))
    }
}
