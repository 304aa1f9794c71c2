//! Interface definitions for the bulk transport.
//!
//! This module defines the abstract `BulkTransport` trait that allows for
//! dependency injection and swappable search backend implementations.

mod bulk_transport;

pub use bulk_transport::{BulkHttpResponse, BulkTransport};
