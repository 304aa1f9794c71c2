//! Bulk response parsing.

use serde::Deserialize;
use std::collections::HashMap;

use crate::bulk::item::BulkItem;
use crate::errors::SearchIndexError;

#[derive(Debug, Deserialize)]
pub(crate) struct BulkResponseBody {
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<HashMap<String, BulkItemResult>>,
}

/// Per-item result keyed under its action name in the response.
#[derive(Debug, Deserialize)]
pub(crate) struct BulkItemResult {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub error: Option<BulkItemError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BulkItemError {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub reason: Option<String>,
}

impl BulkItemResult {
    /// An item failed when it carries an error type or its status is above 201.
    pub fn is_failure(&self) -> bool {
        let has_error = self
            .error
            .as_ref()
            .is_some_and(|error| !error.kind.is_empty());
        has_error || self.status > 201
    }
}

/// Parse a bulk response body and return the IDs of the failed documents.
///
/// The failed ID is taken from the pending item at the same position, since
/// the engine may omit `_id` on some errors. A response whose item count does
/// not match the request is treated as malformed.
pub(crate) fn failed_document_ids(
    body: &[u8],
    pending: &[BulkItem],
) -> Result<Vec<String>, SearchIndexError> {
    let response: BulkResponseBody = serde_json::from_slice(body)
        .map_err(|e| SearchIndexError::parse(format!("invalid bulk response: {}", e)))?;

    if response.items.len() != pending.len() {
        return Err(SearchIndexError::parse(format!(
            "bulk response has {} items, request had {}",
            response.items.len(),
            pending.len()
        )));
    }

    let mut failed = Vec::new();
    for (position, (entry, item)) in response.items.iter().zip(pending).enumerate() {
        let Some(result) = entry.values().next() else {
            return Err(SearchIndexError::parse(format!(
                "bulk response item {} is empty",
                position
            )));
        };

        if result.is_failure() {
            let (kind, reason) = result
                .error
                .as_ref()
                .map(|e| (e.kind.as_str(), e.reason.as_deref().unwrap_or_default()))
                .unwrap_or_default();
            tracing::debug!(
                doc_id = %item.document_id(),
                response_id = ?result.id,
                status = result.status,
                error_type = %kind,
                reason = %reason,
                "Bulk item rejected"
            );
            failed.push(item.document_id().to_string());
        }
    }

    if failed.is_empty() && response.errors {
        tracing::warn!("Bulk response flagged errors but no item failed");
    }

    Ok(failed)
}
