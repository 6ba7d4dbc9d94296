/// Document validation utilities.
use serde_json::Value;
use thiserror::Error;

use super::model::{Document, ID_FIELD};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Document must contain '_id' field.")]
    MissingId,
    #[error("Document '_id' must be a string.")]
    NonStringId,
}

/// Return the document's `_id`, which must be present and a string.
///
/// Whether the store accepts the id itself (empty, reserved prefix) is left
/// to the store.
pub fn document_id(doc: &Document) -> Result<&str, ValidationError> {
    match doc.get(ID_FIELD) {
        None => Err(ValidationError::MissingId),
        Some(Value::String(id)) => Ok(id.as_str()),
        Some(_) => Err(ValidationError::NonStringId),
    }
}
