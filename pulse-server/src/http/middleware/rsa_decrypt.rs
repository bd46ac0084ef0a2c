//! RSA body decryption stage.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

use pulse_core::crypto::keys;

use crate::state::AppState;

use super::{buffer_request, error_json, rebuild_request};

/// Decrypt the request body with the configured private key. The agent
/// encrypts the whole body as one PKCS#1 v1.5 block.
pub async fn decrypt(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(key) = state.private_key.clone() else {
        return next.run(req).await;
    };

    let (mut parts, bytes) = match buffer_request(req).await {
        Ok(buffered) => buffered,
        Err(response) => return response,
    };

    let decrypted = match keys::decrypt(&key, &bytes) {
        Ok(decrypted) => decrypted,
        Err(err) => {
            debug!(%err, "can't decrypt body");
            return error_json(StatusCode::INTERNAL_SERVER_ERROR, "can't decrypt body");
        }
    };

    debug!("body decrypted");
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);

    next.run(rebuild_request(parts, decrypted.into())).await
}
