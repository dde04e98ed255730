use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer};

use crate::cache::CacheStore;
use crate::query;

#[derive(Clone)]
pub struct AppState {
    pub cache: CacheStore,
}

impl AppState {
    pub fn new(cache: CacheStore) -> Self {
        Self { cache }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/search", get(search).layer(CompressionLayer::new().gzip(true)))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn search(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    match query::search(&state.cache, &q) {
        Ok(body) => (
            [(header::CONTENT_TYPE, "application/json;charset=utf-8")],
            body,
        )
            .into_response(),
        // client mistake, not worth a warning
        Err(e) => {
            tracing::debug!(target: "search", error = %e, "rejected search");
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
    }
}
