//! HTTP transport: router assembly and the ingest middleware chain.

use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;

use crate::state::AppState;

pub mod handlers;
pub mod middleware;

/// Build the public router. Middleware stages run top to bottom on the
/// way in; optional stages no-op unless configured in `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::webpage))
        .route("/ping", get(handlers::ping))
        .route("/update", post(handlers::update_json))
        .route("/update/", post(handlers::update_json))
        .route("/update/:kind/:name/:value", post(handlers::update_url))
        .route("/updates", post(handlers::updates_json))
        .route("/updates/", post(handlers::updates_json))
        .route("/value", post(handlers::value_json))
        .route("/value/", post(handlers::value_json))
        .route("/value/:kind/:name", get(handlers::value_url))
        .fallback(handlers::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(state.clone(), middleware::trusted_subnet::check))
                .layer(CompressionLayer::new())
                .layer(from_fn(middleware::decompress::gzip))
                .layer(from_fn_with_state(state.clone(), middleware::rsa_decrypt::decrypt))
                .layer(from_fn(middleware::request_log::log))
                .layer(from_fn_with_state(state.clone(), middleware::verify_hash::check))
                .layer(from_fn_with_state(state.clone(), middleware::sign_response::set))
                .layer(from_fn_with_state(state.clone(), middleware::write_sync::save)),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests;
