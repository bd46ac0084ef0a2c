//! Response signing stage.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, warn};

use pulse_core::crypto::sign;

use crate::state::AppState;

use super::verify_hash::HASH_HEADER;

/// Sign the response body with the shared key, setting the
/// `HashSHA256` header so clients can verify what they received.
pub async fn set(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(key) = state.hash_key.clone() else {
        return next.run(req).await;
    };

    let response = next.run(req).await;

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(%err, "can't read response body for signing");
            return Response::from_parts(parts, Body::empty());
        }
    };

    match sign::sign(&bytes, &key) {
        Ok(digest) => {
            if let Ok(value) = HeaderValue::from_str(&digest) {
                debug!(hash = %digest, "hash added to the response header");
                parts.headers.insert(HASH_HEADER, value);
            }
        }
        Err(err) => warn!(%err, "can't compute response hash"),
    }

    Response::from_parts(parts, Body::from(bytes))
}
