pub mod couch;
#[cfg(feature = "testing")]
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::document::Document;

pub use couch::CouchDb;

/// Errors reported by a document store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store responded {status}: {error}: {reason}")]
    Upstream {
        status: u16,
        error: String,
        reason: String,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid store url: {0}")]
    InvalidUrl(String),

    #[error("malformed store response: {0}")]
    Malformed(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of the startup bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseStatus {
    Created,
    Existing,
}

/// An attachment to be written under a document revision.
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Attachment content as returned by the store, streamed.
pub struct AttachmentStream {
    pub content_type: String,
    pub content: BoxStream<'static, StoreResult<Bytes>>,
}

impl std::fmt::Debug for AttachmentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentStream")
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// A single document database.
///
/// Implementations are shared by every in-flight request and must be safe
/// for concurrent use.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create the database if it does not exist yet.
    async fn ensure_database(&self) -> StoreResult<DatabaseStatus>;

    /// Check that the store is reachable.
    async fn ping(&self) -> StoreResult<()>;

    async fn get_document(&self, id: &str) -> StoreResult<Document>;

    /// Write `doc` at `id`. Updates must carry the current `_rev`.
    /// Returns the new revision.
    async fn put_document(&self, id: &str, doc: &Document) -> StoreResult<String>;

    /// Delete revision `rev` of `id`. Returns the tombstone revision.
    async fn delete_document(&self, id: &str, rev: &str) -> StoreResult<String>;

    /// Attach a file to revision `rev` of `doc_id`. Returns the new revision.
    async fn put_attachment(
        &self,
        doc_id: &str,
        rev: &str,
        attachment: NewAttachment,
    ) -> StoreResult<String>;

    async fn get_attachment(&self, doc_id: &str, filename: &str) -> StoreResult<AttachmentStream>;

    /// Every document with its body (`_all_docs?include_docs=true`), as the store returned it.
    async fn all_documents(&self) -> StoreResult<Value>;

    /// Change feed filtered by the server-side filter function `filter`.
    async fn changes(&self, filter: &str, params: &[(&str, String)]) -> StoreResult<Value>;
}
