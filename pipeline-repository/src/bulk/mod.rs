//! Bulk request building.
//!
//! `BulkItem` describes one document mutation and `BulkWriteBuffer` turns a
//! sequence of items into the NDJSON body of a single bulk request.

mod buffer;
mod item;
pub(crate) mod response;

pub use buffer::BulkWriteBuffer;
pub use item::{BulkAction, BulkBody, BulkItem};
