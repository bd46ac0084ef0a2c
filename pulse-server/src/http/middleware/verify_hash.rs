//! HMAC verification stage.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, info};

use pulse_core::crypto::sign;

use crate::state::AppState;

use super::{buffer_request, error_json, rebuild_request};

pub const HASH_HEADER: &str = "HashSHA256";

/// Verify the `HashSHA256` header against the body under the shared
/// key. Verification is opt-in per request: an absent or empty header
/// forwards even when a key is configured.
pub async fn check(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(key) = state.hash_key.clone() else {
        return next.run(req).await;
    };

    let header = req
        .headers()
        .get(HASH_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if header.is_empty() {
        debug!("hash header is empty, skip check");
        return next.run(req).await;
    }

    let (parts, bytes) = match buffer_request(req).await {
        Ok(buffered) => buffered,
        Err(response) => return response,
    };

    match sign::verify(&bytes, &key, &header) {
        Ok(true) => {
            debug!("hash check OK");
            next.run(rebuild_request(parts, bytes)).await
        }
        Ok(false) => {
            info!("computed hash doesn't match the one provided in the HashSHA256 header");
            error_json(StatusCode::BAD_REQUEST, "can't check hash")
        }
        Err(err) => {
            info!(%err, "can't check hash");
            error_json(StatusCode::BAD_REQUEST, "can't check hash")
        }
    }
}
