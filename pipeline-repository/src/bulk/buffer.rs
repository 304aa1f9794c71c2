//! Bulk write buffer.
//!
//! Accumulates the NDJSON body of one bulk request together with the items
//! it was built from. The buffer owns no network state; see
//! [`SearchBulkClient`](crate::SearchBulkClient) for flushing.

use std::collections::BTreeMap;
use std::io::{self, SeekFrom};

use crate::bulk::item::BulkItem;
use crate::errors::SearchIndexError;

/// Default initial capacity of the body buffer.
const DEFAULT_CAPACITY_BYTES: usize = 64 * 1024;

/// NDJSON body of one bulk request plus its pending items.
///
/// `items` mirrors the buffer entry for entry: every item added contributes
/// exactly one metadata line and, when it has a body, one body line. A failed
/// [`add`](Self::add) leaves both untouched.
///
/// Not internally synchronized. All methods take `&mut self`, so one buffer
/// has exactly one writer.
#[derive(Debug)]
pub struct BulkWriteBuffer {
    buf: Vec<u8>,
    aux: Vec<u8>,
    items: Vec<BulkItem>,
}

impl Default for BulkWriteBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY_BYTES)
    }
}

impl BulkWriteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer that preallocates `capacity` bytes for the body.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            aux: Vec::with_capacity(1024),
            items: Vec::new(),
        }
    }

    /// Append one item to the pending request.
    ///
    /// Serializes the action metadata, then copies the body and rewinds its
    /// stream. On error the buffer is truncated back to where it was and the
    /// item is dropped, so `items` and the body stay consistent.
    pub fn add(&mut self, mut item: BulkItem) -> Result<(), SearchIndexError> {
        let mark = self.buf.len();

        self.write_meta(&item)?;

        if let Err(e) = self.write_body(&mut item) {
            self.buf.truncate(mark);
            return Err(e);
        }

        self.items.push(item);
        Ok(())
    }

    /// Serialize the action metadata line.
    ///
    /// The metadata is rendered into the scratch buffer first, so a
    /// serialization error never touches the body buffer.
    fn write_meta(&mut self, item: &BulkItem) -> Result<(), SearchIndexError> {
        self.aux.clear();

        let line = BTreeMap::from([(item.action().as_str(), item.meta())]);
        serde_json::to_writer(&mut self.aux, &line)
            .map_err(|e| SearchIndexError::serialization(e.to_string()))?;

        self.buf.extend_from_slice(&self.aux);
        self.buf.push(b'\n');
        Ok(())
    }

    /// Copy the body line and rewind the body stream.
    fn write_body(&mut self, item: &mut BulkItem) -> Result<(), SearchIndexError> {
        let Some(body) = item.body_mut() else {
            return Ok(());
        };

        io::copy(body, &mut self.buf).map_err(|e| SearchIndexError::body(e.to_string()))?;
        self.buf.push(b'\n');

        body.seek(SeekFrom::Start(0))
            .map_err(|e| SearchIndexError::body(format!("failed to rewind body: {}", e)))?;
        Ok(())
    }

    /// Items currently pending, in buffer order.
    pub fn items(&self) -> &[BulkItem] {
        &self.items
    }

    /// Raw NDJSON bytes of the pending request.
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Number of pending items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Size of the pending request body in bytes.
    pub fn byte_len(&self) -> usize {
        self.buf.len()
    }

    /// Drop every pending item and the body, keeping the allocations.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.aux.clear();
        self.items.clear();
    }

    /// Reset the buffer and hand back the items it held.
    pub fn take_items(&mut self) -> Vec<BulkItem> {
        let items = std::mem::take(&mut self.items);
        self.reset();
        items
    }
}
