use axum::extract::DefaultBodyLimit;

/// Cap request bodies at `max_bytes`, replacing axum's 2 MiB default.
///
/// The cap is enforced by the body extractors, so an oversized request is
/// refused through `ApiError` and keeps the JSON error envelope.
pub fn body_limit_layer(max_bytes: usize) -> DefaultBodyLimit {
    DefaultBodyLimit::max(max_bytes)
}
