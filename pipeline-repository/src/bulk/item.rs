//! Bulk item types.
//!
//! A `BulkItem` is one document mutation inside a bulk request: the action
//! metadata line plus an optional body.

use serde::Serialize;
use std::fmt;
use std::io::{Cursor, Read, Seek};

/// A re-seekable document body.
///
/// The buffer copies the body and then rewinds it, so the same item can be
/// added again on retry.
pub trait BulkBody: Read + Seek + Send {}

impl<T: Read + Seek + Send> BulkBody for T {}

/// Kind of mutation a bulk item performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    Index,
    Update,
    Delete,
}

impl BulkAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for BulkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action metadata as written on the first line of a bulk entry.
#[derive(Debug, Serialize)]
pub(crate) struct ActionMeta<'a> {
    #[serde(rename = "_index")]
    pub index: &'a str,
    #[serde(rename = "_id", skip_serializing_if = "str::is_empty")]
    pub id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_alias: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_on_conflict: Option<u32>,
}

/// One document mutation.
///
/// # Example
///
/// ```
/// use pipeline_repository::{BulkAction, BulkItem};
///
/// let item = BulkItem::index("mdl-nginx", "doc-1", br#"{"message":"hello"}"#.to_vec())
///     .with_routing("shard-key")
///     .with_require_alias(true);
///
/// assert_eq!(item.action(), BulkAction::Index);
/// assert_eq!(item.document_id(), "doc-1");
/// ```
pub struct BulkItem {
    action: BulkAction,
    index: String,
    document_id: String,
    routing: Option<String>,
    require_alias: Option<bool>,
    retry_on_conflict: Option<u32>,
    body: Option<Box<dyn BulkBody>>,
}

impl BulkItem {
    /// Create an item without a body.
    pub fn new(action: BulkAction, index: impl Into<String>, document_id: impl Into<String>) -> Self {
        Self {
            action,
            index: index.into(),
            document_id: document_id.into(),
            routing: None,
            require_alias: None,
            retry_on_conflict: None,
            body: None,
        }
    }

    /// Create an `index` item with an in-memory body.
    pub fn index(
        index: impl Into<String>,
        document_id: impl Into<String>,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        Self::new(BulkAction::Index, index, document_id).with_body(body)
    }

    /// Create a `delete` item. Deletes carry no body line.
    pub fn delete(index: impl Into<String>, document_id: impl Into<String>) -> Self {
        Self::new(BulkAction::Delete, index, document_id)
    }

    /// Attach an in-memory body.
    pub fn with_body(self, body: impl Into<Vec<u8>>) -> Self {
        self.with_body_reader(Cursor::new(body.into()))
    }

    /// Attach any re-seekable body stream.
    pub fn with_body_reader(mut self, body: impl BulkBody + 'static) -> Self {
        self.body = Some(Box::new(body));
        self
    }

    pub fn with_routing(mut self, routing: impl Into<String>) -> Self {
        self.routing = Some(routing.into());
        self
    }

    pub fn with_require_alias(mut self, require_alias: bool) -> Self {
        self.require_alias = Some(require_alias);
        self
    }

    pub fn with_retry_on_conflict(mut self, retries: u32) -> Self {
        self.retry_on_conflict = Some(retries);
        self
    }

    pub fn action(&self) -> BulkAction {
        self.action
    }

    pub fn index_name(&self) -> &str {
        &self.index
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn routing(&self) -> Option<&str> {
        self.routing.as_deref()
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub(crate) fn meta(&self) -> ActionMeta<'_> {
        ActionMeta {
            index: &self.index,
            id: &self.document_id,
            routing: self.routing.as_deref(),
            require_alias: self.require_alias,
            retry_on_conflict: self.retry_on_conflict,
        }
    }

    pub(crate) fn body_mut(&mut self) -> Option<&mut Box<dyn BulkBody>> {
        self.body.as_mut()
    }
}

impl fmt::Debug for BulkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkItem")
            .field("action", &self.action)
            .field("index", &self.index)
            .field("document_id", &self.document_id)
            .field("routing", &self.routing)
            .field("require_alias", &self.require_alias)
            .field("retry_on_conflict", &self.retry_on_conflict)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}
