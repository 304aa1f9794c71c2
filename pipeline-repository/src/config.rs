//! Configuration types for the SearchBulkClient.

/// Default preallocated size of the bulk body: one full 5 MiB batch.
pub const DEFAULT_BUFFER_CAPACITY_BYTES: usize = 5 * 1024 * 1024;

/// Configuration for the SearchBulkClient.
///
/// The capacity is only a preallocation hint. When to flush is decided by the
/// caller; the buffer grows past this size if nobody flushes it.
#[derive(Debug, Clone)]
pub struct BulkClientConfig {
    /// Bytes preallocated for the pending request body.
    pub buffer_capacity_bytes: usize,
}

impl Default for BulkClientConfig {
    fn default() -> Self {
        Self {
            buffer_capacity_bytes: DEFAULT_BUFFER_CAPACITY_BYTES,
        }
    }
}

impl BulkClientConfig {
    /// Create a config sized for batches of `bytes`.
    pub fn with_buffer_capacity(bytes: usize) -> Self {
        Self {
            buffer_capacity_bytes: bytes,
        }
    }
}
