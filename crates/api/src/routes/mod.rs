pub mod attachments;
pub mod changes;
pub mod documents;
pub mod health;
pub mod swagger;

use axum::Router;

use crate::middleware::body_limit::body_limit_layer;
use crate::state::AppState;

/// Assemble the full router with all route groups.
pub fn build_router(state: AppState) -> Router {
    let max_body_bytes = state.config().max_body_bytes;
    Router::new()
        .merge(health::routes())
        .merge(documents::routes())
        .merge(attachments::routes())
        .merge(changes::routes())
        .merge(swagger::routes())
        .layer(body_limit_layer(max_body_bytes))
        .with_state(state)
}
