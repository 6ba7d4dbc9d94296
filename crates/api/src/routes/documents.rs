use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Path, State},
    routing::{get, post},
    Json, Router,
};
use couch_gateway_core::document::model::{merge_fields, revision};
use couch_gateway_core::document::validate::document_id;
use couch_gateway_core::document::Document;
use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::response::Envelope;
use crate::state::AppState;

const DOCUMENT_NOT_FOUND: &str = "Document not found";

/// Document CRUD routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/insert", post(insert_document))
        .route("/documents", get(list_documents))
        .route(
            "/document/{doc_id}",
            get(get_document).put(update_document).delete(delete_document),
        )
}

/// Decode a JSON object body. The `Content-Type` header is not consulted.
fn decode_document(body: Result<Bytes, BytesRejection>) -> ApiResult<Document> {
    Ok(serde_json::from_slice(&body?)?)
}

async fn insert_document(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<Json<&'static str>> {
    let doc = decode_document(body)?;
    let id = document_id(&doc)?;

    let rev = state
        .store()
        .put_document(id, &doc)
        .await
        .map_err(|e| ApiError::upstream(e, "Failed to insert document"))?;

    tracing::info!(doc_id = %id, rev = %rev, "Document inserted");
    Ok(Json("Document inserted successfully."))
}

/// Raw `_all_docs` listing, bodies included.
async fn list_documents(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let listing = state
        .store()
        .all_documents()
        .await
        .map_err(|e| ApiError::upstream(e, "Failed to retrieve documents"))?;
    Ok(Json(listing))
}

async fn get_document(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
) -> ApiResult<Json<Document>> {
    let doc = state
        .store()
        .get_document(&doc_id)
        .await
        .map_err(|e| ApiError::lookup(e, DOCUMENT_NOT_FOUND, "Failed to retrieve document"))?;
    Ok(Json(doc))
}

/// Shallow merge: top-level fields of the body replace the stored ones.
async fn update_document(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<Json<Envelope>> {
    let mut existing = state
        .store()
        .get_document(&doc_id)
        .await
        .map_err(|e| ApiError::lookup(e, DOCUMENT_NOT_FOUND, "Failed to retrieve document"))?;

    // The body is only looked at once the document is known to exist.
    let patch = decode_document(body)?;
    merge_fields(&mut existing, patch);

    let rev = state
        .store()
        .put_document(&doc_id, &existing)
        .await
        .map_err(|e| ApiError::upstream(e, "Failed to update document"))?;

    tracing::info!(doc_id = %doc_id, rev = %rev, "Document updated");
    Ok(Json(
        Envelope::message("Document updated successfully").with_rev(rev),
    ))
}

async fn delete_document(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
) -> ApiResult<Json<Envelope>> {
    let doc = state
        .store()
        .get_document(&doc_id)
        .await
        .map_err(|e| ApiError::lookup(e, DOCUMENT_NOT_FOUND, "Failed to retrieve document"))?;
    let rev = revision(&doc)
        .ok_or_else(|| ApiError::Internal(format!("Document {doc_id} has no revision")))?;

    state
        .store()
        .delete_document(&doc_id, rev)
        .await
        .map_err(|e| ApiError::upstream(e, "Failed to delete document"))?;

    tracing::info!(doc_id = %doc_id, rev = %rev, "Document deleted");
    Ok(Json(Envelope::message("Document deleted successfully")))
}
