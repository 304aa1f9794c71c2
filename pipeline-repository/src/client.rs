//! Bulk client.
//!
//! `SearchBulkClient` owns a `BulkWriteBuffer` and a `BulkTransport`. Items are
//! added one at a time and sent together by [`SearchBulkClient::flush`].

use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::bulk::{response, BulkItem, BulkWriteBuffer};
use crate::config::BulkClientConfig;
use crate::errors::{BulkFlushError, SearchIndexError};
use crate::interfaces::BulkTransport;

/// Result of a successful flush.
#[derive(Debug)]
pub enum FlushOutcome {
    /// Nothing was pending; no request was made.
    Empty,
    /// Every pending item was accepted. The buffer has been reset and the
    /// items are handed back to the caller.
    Indexed { items: Vec<BulkItem> },
}

impl FlushOutcome {
    /// Number of documents indexed by this flush.
    pub fn indexed_count(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Indexed { items } => items.len(),
        }
    }
}

/// Buffered bulk client.
///
/// All mutating methods take `&mut self`; a client has one writer and does
/// no locking of its own.
pub struct SearchBulkClient {
    transport: Arc<dyn BulkTransport>,
    buffer: BulkWriteBuffer,
}

impl SearchBulkClient {
    /// Create a client with the default configuration.
    pub fn new(transport: Arc<dyn BulkTransport>) -> Self {
        Self::with_config(transport, BulkClientConfig::default())
    }

    pub fn with_config(transport: Arc<dyn BulkTransport>, config: BulkClientConfig) -> Self {
        Self {
            transport,
            buffer: BulkWriteBuffer::with_capacity(config.buffer_capacity_bytes),
        }
    }

    /// Append an item to the pending request. See [`BulkWriteBuffer::add`].
    pub fn add(&mut self, item: BulkItem) -> Result<(), SearchIndexError> {
        self.buffer.add(item)
    }

    /// Send every pending item as one bulk request.
    ///
    /// On any error the buffer is left exactly as it was, so calling `flush`
    /// again re-sends byte-identical content. The buffer is reset only when
    /// every item succeeded.
    ///
    /// # Returns
    ///
    /// * `Ok(FlushOutcome::Empty)` - Nothing was pending
    /// * `Ok(FlushOutcome::Indexed)` - All items were accepted
    /// * `Err(BulkFlushError::PartialFailure)` - Some documents were rejected
    /// * `Err(BulkFlushError::Request)` - Transport failure, non-2xx status or
    ///   malformed response
    #[instrument(skip(self), fields(items = self.buffer.len(), bytes = self.buffer.byte_len()))]
    pub async fn flush(&mut self) -> Result<FlushOutcome, BulkFlushError> {
        if self.buffer.is_empty() {
            return Ok(FlushOutcome::Empty);
        }

        let body = self.buffer.bytes().to_vec();
        let response = self.transport.send_bulk(body).await?;

        if !response.is_success() {
            let body = String::from_utf8_lossy(&response.body).into_owned();
            warn!(status = response.status, "Bulk request rejected");
            return Err(SearchIndexError::response_status(response.status, body).into());
        }

        let failed_ids = response::failed_document_ids(&response.body, self.buffer.items())?;
        if !failed_ids.is_empty() {
            warn!(
                failed = failed_ids.len(),
                total = self.buffer.len(),
                "Bulk flush had failed documents"
            );
            return Err(BulkFlushError::PartialFailure { failed_ids });
        }

        let items = self.buffer.take_items();
        debug!(indexed = items.len(), "Bulk flush succeeded");
        Ok(FlushOutcome::Indexed { items })
    }

    /// Items waiting for the next flush, in request order.
    pub fn pending_items(&self) -> &[BulkItem] {
        self.buffer.items()
    }

    /// Document IDs of the pending items.
    pub fn pending_ids(&self) -> Vec<String> {
        self.buffer
            .items()
            .iter()
            .map(|item| item.document_id().to_string())
            .collect()
    }

    /// Drop everything pending.
    pub fn reset(&mut self) {
        self.buffer.reset();
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Size of the pending request body in bytes.
    pub fn byte_len(&self) -> usize {
        self.buffer.byte_len()
    }
}
