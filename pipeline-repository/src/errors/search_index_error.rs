//! Search index error types.
//!
//! This module defines the error type for all search engine operations,
//! from building a bulk body locally to reading the engine's response.

use thiserror::Error;

/// Errors from search index operations.
///
/// Used by the `BulkTransport` trait, the `BulkWriteBuffer` and the
/// `SearchBulkClient`. None of these variants carry per-document detail; a
/// bulk response that names failed documents is reported through
/// [`BulkFlushError::PartialFailure`](crate::BulkFlushError::PartialFailure).
#[derive(Debug, Clone, Error)]
pub enum SearchIndexError {
    /// Failed to establish connection to the search index backend.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The request could not be sent or its response could not be read.
    #[error("Request error: {0}")]
    RequestError(String),

    /// The engine answered the bulk request with a non-2xx status.
    #[error("Bulk request failed with status {status}: {body}")]
    ResponseStatus { status: u16, body: String },

    /// Failed to parse response from search index backend.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Failed to serialize action metadata.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Failed to copy or rewind a document body.
    #[error("Body error: {0}")]
    BodyError(String),
}

impl SearchIndexError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create a request error.
    pub fn request(msg: impl Into<String>) -> Self {
        Self::RequestError(msg.into())
    }

    /// Create a response status error.
    pub fn response_status(status: u16, body: impl Into<String>) -> Self {
        Self::ResponseStatus {
            status,
            body: body.into(),
        }
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Create a body error.
    pub fn body(msg: impl Into<String>) -> Self {
        Self::BodyError(msg.into())
    }
}
