use axum::{
    extract::Path,
    http::header,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};

use crate::error::ApiError;
use crate::state::AppState;

const INDEX_HTML: &str = include_str!("../../assets/swagger/index.html");
const OPENAPI_JSON: &str = include_str!("../../assets/swagger/openapi.json");

/// Static interactive API documentation.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/swagger", get(|| async { Redirect::temporary("/swagger/index.html") }))
        .route("/swagger/{*asset}", get(swagger_asset))
}

async fn swagger_asset(Path(asset): Path<String>) -> Response {
    match asset.as_str() {
        "" | "index.html" => Html(INDEX_HTML).into_response(),
        "doc.json" => ([(header::CONTENT_TYPE, "application/json")], OPENAPI_JSON).into_response(),
        _ => ApiError::NotFound(format!("No documentation at /swagger/{asset}")).into_response(),
    }
}
