use serde_json::{Map, Value};

/// Schema-free CouchDB document. Field order is preserved through round-trips.
pub type Document = Map<String, Value>;

pub const ID_FIELD: &str = "_id";
pub const REV_FIELD: &str = "_rev";
pub const ATTACHMENTS_FIELD: &str = "_attachments";

/// The revision token the store assigned on the last write, if any.
pub fn revision(doc: &Document) -> Option<&str> {
    doc.get(REV_FIELD).and_then(Value::as_str)
}

/// Overwrite top-level fields of `existing` with those of `patch`.
///
/// Nested objects are replaced wholesale, never merged recursively. Fields
/// absent from `patch` are left untouched.
pub fn merge_fields(existing: &mut Document, patch: Document) {
    for (key, value) in patch {
        existing.insert(key, value);
    }
}
