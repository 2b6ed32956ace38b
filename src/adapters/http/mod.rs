pub mod routes;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::adapters::http::state::AppContext;

/// Margen para cabeceras y delimitadores multipart sobre el tamaño máximo de fichero.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn router(state: AppContext) -> Router {
    let body_limit = state.api.max_upload_bytes() + MULTIPART_OVERHEAD;

    Router::new()
        .route("/", get(routes::root))
        .route("/health/", get(routes::health))
        .route("/info/", get(routes::info))
        .route("/predict/", post(routes::predict))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
