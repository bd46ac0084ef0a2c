//! Request logging stage.

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, info};

use super::{buffer_request, rebuild_request};

/// Log every request with its method, uri, status, and latency. The
/// body is buffered so it can be logged at debug level and handed on
/// intact.
pub async fn log(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();

    let (parts, bytes) = match buffer_request(req).await {
        Ok(buffered) => buffered,
        Err(response) => return response,
    };
    debug!(%method, %uri, body = %String::from_utf8_lossy(&bytes), "request body");

    let start = Instant::now();
    let response = next.run(rebuild_request(parts, bytes)).await;

    info!(
        %method,
        %uri,
        status = response.status().as_u16(),
        duration = ?start.elapsed(),
        "request"
    );

    response
}
