use axum::{
    body::Body,
    extract::{multipart::MultipartRejection, Multipart, Path, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use couch_gateway_core::document::model::revision;
use couch_gateway_core::store::NewAttachment;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const FILE_FIELD: &str = "file";
const DOC_ID_FIELD: &str = "docID";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Attachment upload and download routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload_file))
        .route("/file/{doc_id}/{filename}", get(download_file))
}

/// Attach the multipart `file` to the current revision of `docID`.
async fn upload_file(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Value>> {
    let mut multipart =
        multipart.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let mut doc_id = None;
    let mut file = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            DOC_ID_FIELD => {
                doc_id = Some(field.text().await?);
            }
            FILE_FIELD => {
                let filename = field
                    .file_name()
                    .filter(|filename| !filename.is_empty())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        ApiError::BadRequest(format!("Field '{FILE_FIELD}' must be a file upload"))
                    })?;
                let content_type = field
                    .content_type()
                    .unwrap_or(DEFAULT_CONTENT_TYPE)
                    .to_string();
                let data = field.bytes().await?;
                file = Some(NewAttachment {
                    filename,
                    content_type,
                    data,
                });
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| {
        ApiError::BadRequest(format!("Form field '{FILE_FIELD}' is required"))
    })?;
    // An absent `docID` is an empty id; the fetch below fails on it.
    let doc_id = doc_id.unwrap_or_default();

    // Any fetch failure is a 500 here, a missing document included.
    let doc = state
        .store()
        .get_document(&doc_id)
        .await
        .map_err(|e| ApiError::upstream(e, "Failed to get document"))?;
    let rev = revision(&doc)
        .ok_or_else(|| ApiError::Internal(format!("Document {doc_id} has no revision")))?;

    let filename = file.filename.clone();
    let size = file.data.len();
    let new_rev = state
        .store()
        .put_attachment(&doc_id, rev, file)
        .await
        .map_err(|e| ApiError::upstream(e, "Failed to upload file"))?;

    tracing::info!(
        doc_id = %doc_id,
        filename = %filename,
        size,
        rev = %new_rev,
        "Attachment uploaded"
    );
    Ok(Json(json!({ "status": "File uploaded successfully" })))
}

/// Stream an attachment back with its stored content type.
async fn download_file(
    State(state): State<AppState>,
    Path((doc_id, filename)): Path<(String, String)>,
) -> ApiResult<Response> {
    let attachment = state
        .store()
        .get_attachment(&doc_id, &filename)
        .await
        .map_err(|e| ApiError::lookup(e, "File not found", "Failed to retrieve file"))?;

    let content_type = HeaderValue::from_str(&attachment.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));

    tracing::info!(doc_id = %doc_id, filename = %filename, "Attachment download started");
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, content_disposition(&filename)),
        ],
        Body::from_stream(attachment.content),
    )
        .into_response())
}

/// `attachment; filename=<name>` for plain ASCII names, the RFC 5987
/// `filename*=UTF-8''<percent-encoded>` form for everything else.
fn content_disposition(filename: &str) -> HeaderValue {
    let plain = filename.is_ascii()
        && !filename
            .chars()
            .any(|c| c.is_ascii_control() || c == '"' || c == ';');
    let value = if plain {
        format!("attachment; filename={filename}")
    } else {
        let encoded = utf8_percent_encode(filename, NON_ALPHANUMERIC);
        format!("attachment; filename*=UTF-8''{encoded}")
    };
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

#[cfg(test)]
mod tests {
    use axum::http::{header, Method, StatusCode};
    use serde_json::json;

    use super::content_disposition;
    use crate::routes::test_support::{empty, multipart_upload, send, send_json, test_app};

    #[test]
    fn disposition_falls_back_to_encoded_filename() {
        assert_eq!(content_disposition("cv.pdf"), "attachment; filename=cv.pdf");
        assert_eq!(
            content_disposition("cv final.pdf"),
            "attachment; filename=cv final.pdf"
        );
        assert_eq!(
            content_disposition("résumé.pdf"),
            "attachment; filename*=UTF-8''r%C3%A9sum%C3%A9%2Epdf"
        );
        assert_eq!(
            content_disposition("a;b\".txt"),
            "attachment; filename*=UTF-8''a%3Bb%22%2Etxt"
        );
        assert_eq!(
            content_disposition("tab\tname"),
            "attachment; filename*=UTF-8''tab%09name"
        );
    }

    #[tokio::test]
    async fn upload_then_download() {
        let (app, _store) = test_app();
        send_json(&app, Method::POST, "/insert", Some(json!({"_id": "s1", "name": "Ann"}))).await;

        let (status, _, body) = send(
            &app,
            multipart_upload(Some("s1"), Some(("cv.txt", "text/plain", &b"hello world"[..]))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, json!({"status": "File uploaded successfully"}));

        let (status, headers, content) = send(&app, empty(Method::GET, "/file/s1/cv.txt")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
        assert_eq!(headers[header::CONTENT_DISPOSITION], "attachment; filename=cv.txt");
        assert_eq!(&content[..], b"hello world");

        // The document keeps its fields and now lists the attachment.
        let (_, stored) = send_json(&app, Method::GET, "/document/s1", None).await;
        assert_eq!(stored["name"], "Ann");
        assert_eq!(stored["_attachments"]["cv.txt"]["length"], 11);
    }

    #[tokio::test]
    async fn upload_without_file_is_rejected() {
        let (app, store) = test_app();
        let (status, _, _) = send(&app, multipart_upload(Some("s1"), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(store.total_calls(), 0);
    }

    #[tokio::test]
    async fn upload_without_doc_id_fails_on_fetch() {
        let (app, store) = test_app();
        let file = Some(("a.bin", "application/octet-stream", &b"\x00\x01"[..]));
        for doc_id in [None, Some("")] {
            let (status, _, body) = send(&app, multipart_upload(doc_id, file)).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert!(body["error"].as_str().unwrap().starts_with("Failed to get document"));
        }
        assert_eq!(store.calls("get_document"), 2);
        assert_eq!(store.calls("put_attachment"), 0);
    }

    #[tokio::test]
    async fn upload_requires_multipart_body() {
        let (app, store) = test_app();
        let (status, body) =
            send_json(&app, Method::POST, "/upload", Some(json!({"docID": "s1"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
        assert_eq!(store.total_calls(), 0);
    }

    #[tokio::test]
    async fn upload_to_missing_document_fails_before_writing() {
        let (app, store) = test_app();
        let (status, _, body) = send(
            &app,
            multipart_upload(Some("ghost"), Some(("cv.txt", "text/plain", &b"hello"[..]))),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(body["error"].as_str().unwrap().starts_with("Failed to get document"));
        assert_eq!(store.calls("get_document"), 1);
        assert_eq!(store.calls("put_attachment"), 0);
    }

    #[tokio::test]
    async fn download_missing_attachment_is_not_found() {
        let (app, _store) = test_app();
        send_json(&app, Method::POST, "/insert", Some(json!({"_id": "s1"}))).await;

        let (status, body) = send_json(&app, Method::GET, "/file/s1/nothing.txt", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "File not found"}));

        let (status, _) = send_json(&app, Method::GET, "/file/ghost/cv.txt", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
