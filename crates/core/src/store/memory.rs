//! In-process store with CouchDB revision semantics, for tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde_json::{json, Value};

use super::{
    AttachmentStream, DatabaseStatus, DocumentStore, NewAttachment, StoreError, StoreResult,
};
use crate::document::id::DocumentIdKind;
use crate::document::model::{revision, ATTACHMENTS_FIELD, ID_FIELD, REV_FIELD};
use crate::document::Document;

#[derive(Debug, Clone)]
struct StoredAttachment {
    content_type: String,
    data: Bytes,
}

#[derive(Debug, Clone)]
struct Entry {
    rev: String,
    seq: u64,
    deleted: bool,
    body: Document,
    attachments: BTreeMap<String, StoredAttachment>,
}

impl Entry {
    fn generation(&self) -> u64 {
        self.rev
            .split_once('-')
            .and_then(|(generation, _)| generation.parse().ok())
            .unwrap_or(0)
    }

    fn to_document(&self, id: &str) -> Document {
        let mut doc = Document::new();
        doc.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        doc.insert(REV_FIELD.to_string(), Value::String(self.rev.clone()));
        for (key, value) in &self.body {
            doc.insert(key.clone(), value.clone());
        }
        if !self.attachments.is_empty() {
            let stubs = self
                .attachments
                .iter()
                .map(|(name, attachment)| {
                    (
                        name.clone(),
                        json!({
                            "content_type": attachment.content_type,
                            "length": attachment.data.len(),
                            "stub": true,
                        }),
                    )
                })
                .collect::<serde_json::Map<_, _>>();
            doc.insert(ATTACHMENTS_FIELD.to_string(), Value::Object(stubs));
        }
        doc
    }
}

#[derive(Debug, Default)]
struct Inner {
    exists: bool,
    seq: u64,
    docs: BTreeMap<String, Entry>,
    calls: HashMap<&'static str, usize>,
}

impl Inner {
    fn record(&mut self, operation: &'static str) {
        *self.calls.entry(operation).or_default() += 1;
    }

    fn next_rev(&mut self, generation: u64) -> (String, u64) {
        self.seq += 1;
        let rev = format!("{}-{}", generation + 1, uuid::Uuid::new_v4().simple());
        (rev, self.seq)
    }

    fn live(&self, id: &str) -> StoreResult<&Entry> {
        match self.docs.get(id) {
            Some(entry) if !entry.deleted => Ok(entry),
            Some(_) => Err(StoreError::NotFound("deleted".to_string())),
            None => Err(StoreError::NotFound("missing".to_string())),
        }
    }

    /// Ids CouchDB refuses to write.
    fn check_id(id: &str) -> StoreResult<()> {
        let reason = if id.is_empty() {
            "Document id must not be empty"
        } else if DocumentIdKind::parse(id).is_reserved() {
            "Only reserved document ids may start with underscore."
        } else {
            return Ok(());
        };
        Err(StoreError::Upstream {
            status: 400,
            error: "bad_request".to_string(),
            reason: reason.to_string(),
        })
    }

    /// Reject writes whose `rev` is not the current leaf.
    fn check_rev(&self, id: &str, rev: Option<&str>) -> StoreResult<()> {
        let current = self
            .docs
            .get(id)
            .filter(|entry| !entry.deleted)
            .map(|entry| entry.rev.as_str());
        if current == rev {
            Ok(())
        } else {
            Err(StoreError::Conflict("Document update conflict.".to_string()))
        }
    }
}

/// A `DocumentStore` kept in memory.
///
/// Starts with the database already created; see [`MemoryStore::without_database`].
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                exists: true,
                ..Inner::default()
            }),
        }
    }

    pub fn without_database() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// How many times `operation` (a `DocumentStore` method name) was called.
    pub fn calls(&self, operation: &str) -> usize {
        self.lock().calls.get(operation).copied().unwrap_or(0)
    }

    /// Total calls across all operations.
    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }
}

/// Emulates a CouchDB filter function: every param must equal the document
/// field of the same name, compared in its query-string form.
fn matches_params(body: &Document, params: &[(&str, String)]) -> bool {
    params.iter().all(|(key, expected)| match body.get(*key) {
        Some(Value::String(actual)) => actual == expected,
        Some(Value::Number(actual)) => actual.to_string() == *expected,
        Some(Value::Bool(actual)) => actual.to_string() == *expected,
        _ => false,
    })
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ensure_database(&self) -> StoreResult<DatabaseStatus> {
        let mut inner = self.lock();
        inner.record("ensure_database");
        if inner.exists {
            Ok(DatabaseStatus::Existing)
        } else {
            inner.exists = true;
            Ok(DatabaseStatus::Created)
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        self.lock().record("ping");
        Ok(())
    }

    async fn get_document(&self, id: &str) -> StoreResult<Document> {
        let mut inner = self.lock();
        inner.record("get_document");
        Ok(inner.live(id)?.to_document(id))
    }

    async fn put_document(&self, id: &str, doc: &Document) -> StoreResult<String> {
        let mut inner = self.lock();
        inner.record("put_document");
        Inner::check_id(id)?;
        inner.check_rev(id, revision(doc))?;

        let previous = inner.docs.get(id).cloned();
        let generation = previous.as_ref().map(Entry::generation).unwrap_or(0);
        // Writing without `_attachments` drops them, as CouchDB does.
        let attachments = match (&previous, doc.contains_key(ATTACHMENTS_FIELD)) {
            (Some(entry), true) if !entry.deleted => entry.attachments.clone(),
            _ => BTreeMap::new(),
        };
        let body = doc
            .iter()
            .filter(|(key, _)| !matches!(key.as_str(), ID_FIELD | REV_FIELD | ATTACHMENTS_FIELD))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let (rev, seq) = inner.next_rev(generation);
        inner.docs.insert(
            id.to_string(),
            Entry {
                rev: rev.clone(),
                seq,
                deleted: false,
                body,
                attachments,
            },
        );
        Ok(rev)
    }

    async fn delete_document(&self, id: &str, rev: &str) -> StoreResult<String> {
        let mut inner = self.lock();
        inner.record("delete_document");
        let generation = inner.live(id)?.generation();
        inner.check_rev(id, Some(rev))?;

        let (rev, seq) = inner.next_rev(generation);
        inner.docs.insert(
            id.to_string(),
            Entry {
                rev: rev.clone(),
                seq,
                deleted: true,
                body: Document::new(),
                attachments: BTreeMap::new(),
            },
        );
        Ok(rev)
    }

    async fn put_attachment(
        &self,
        doc_id: &str,
        rev: &str,
        attachment: NewAttachment,
    ) -> StoreResult<String> {
        let mut inner = self.lock();
        inner.record("put_attachment");
        let mut entry = inner.live(doc_id)?.clone();
        inner.check_rev(doc_id, Some(rev))?;

        let (rev, seq) = inner.next_rev(entry.generation());
        entry.rev = rev.clone();
        entry.seq = seq;
        entry.attachments.insert(
            attachment.filename,
            StoredAttachment {
                content_type: attachment.content_type,
                data: attachment.data,
            },
        );
        inner.docs.insert(doc_id.to_string(), entry);
        Ok(rev)
    }

    async fn get_attachment(&self, doc_id: &str, filename: &str) -> StoreResult<AttachmentStream> {
        let mut inner = self.lock();
        inner.record("get_attachment");
        let attachment = inner
            .live(doc_id)?
            .attachments
            .get(filename)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("Document is missing attachment".to_string()))?;
        let data = attachment.data;
        Ok(AttachmentStream {
            content_type: attachment.content_type,
            content: futures::stream::once(async move { Ok(data) }).boxed(),
        })
    }

    async fn all_documents(&self) -> StoreResult<Value> {
        let mut inner = self.lock();
        inner.record("all_documents");
        let rows = inner
            .docs
            .iter()
            .filter(|(_, entry)| !entry.deleted)
            .map(|(id, entry)| {
                json!({
                    "id": id,
                    "key": id,
                    "value": { "rev": entry.rev },
                    "doc": entry.to_document(id),
                })
            })
            .collect::<Vec<_>>();
        Ok(json!({
            "total_rows": rows.len(),
            "offset": 0,
            "rows": rows,
        }))
    }

    async fn changes(&self, filter: &str, params: &[(&str, String)]) -> StoreResult<Value> {
        let mut inner = self.lock();
        inner.record("changes");
        if !filter.contains('/') {
            return Err(StoreError::Upstream {
                status: 400,
                error: "bad_request".to_string(),
                reason: "filter parameter must be of the form `designname/filtername`".to_string(),
            });
        }

        let mut entries = inner.docs.iter().collect::<Vec<_>>();
        entries.sort_by_key(|(_, entry)| entry.seq);
        let results = entries
            .into_iter()
            .filter(|(_, entry)| !entry.deleted && matches_params(&entry.body, params))
            .map(|(id, entry)| {
                json!({
                    "seq": entry.seq,
                    "id": id,
                    "changes": [{ "rev": entry.rev }],
                })
            })
            .collect::<Vec<_>>();
        Ok(json!({
            "results": results,
            "last_seq": inner.seq,
            "pending": 0,
        }))
    }
}
