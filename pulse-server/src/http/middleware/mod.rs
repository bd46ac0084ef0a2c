//! Ordered request-filter chain for the ingestion pipeline.
//!
//! Stages run in a fixed order: trusted-subnet admission, response
//! compression (tower-http), gzip request decompression, RSA body
//! decryption, request logging, HMAC verification, response signing,
//! and synchronous write-back. Each optional stage checks its own
//! configuration in [`crate::state::AppState`] and forwards untouched
//! when the feature is off.

pub mod decompress;
pub mod request_log;
pub mod rsa_decrypt;
pub mod sign_response;
pub mod trusted_subnet;
pub mod verify_hash;
pub mod write_sync;

use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

/// Buffer the whole request body, handing back reusable parts.
pub(crate) async fn buffer_request(
    req: Request,
) -> Result<(axum::http::request::Parts, Bytes), Response> {
    let (parts, body) = req.into_parts();
    match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => Ok((parts, bytes)),
        Err(_) => Err(error_json(StatusCode::BAD_REQUEST, "can't read body")),
    }
}

pub(crate) fn rebuild_request(parts: axum::http::request::Parts, bytes: Bytes) -> Request {
    Request::from_parts(parts, Body::from(bytes))
}

pub(crate) fn error_json(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}
