use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Change feed routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/changes", get(filtered_changes))
}

#[derive(Debug, Deserialize)]
struct ChangesQuery {
    address: Option<String>,
    age: Option<String>,
}

/// `_changes` filtered server-side by the configured design filter.
async fn filtered_changes(
    State(state): State<AppState>,
    Query(query): Query<ChangesQuery>,
) -> ApiResult<Json<Value>> {
    let (address, age) = match (query.address, query.age) {
        (Some(address), Some(age)) if !address.is_empty() && !age.is_empty() => (address, age),
        _ => {
            return Err(ApiError::BadRequest(
                "Address and age are required.".to_string(),
            ))
        }
    };
    let age: i64 = age
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid age format.".to_string()))?;

    let params = [("address", address), ("age", age.to_string())];
    let feed = state
        .store()
        .changes(&state.config().changes_filter, &params)
        .await
        .map_err(|e| ApiError::upstream(e, "Failed to retrieve changes"))?;
    Ok(Json(feed))
}
