//! Gzip request decompression stage.

use std::io::Read;

use axum::extract::Request;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use flate2::read::GzDecoder;
use tracing::debug;

use super::{buffer_request, error_json, rebuild_request};

/// Inflate the request body when `Content-Encoding: gzip` is present.
/// A corrupt stream is rejected with 400.
pub async fn gzip(req: Request, next: Next) -> Response {
    if !has_gzip_encoding(&req) {
        return next.run(req).await;
    }

    let (mut parts, bytes) = match buffer_request(req).await {
        Ok(buffered) => buffered,
        Err(response) => return response,
    };

    let mut decoded = Vec::new();
    if GzDecoder::new(&bytes[..]).read_to_end(&mut decoded).is_err() {
        debug!("can't decompress body");
        return error_json(StatusCode::BAD_REQUEST, "can't decompress");
    }

    debug!(compressed = bytes.len(), decompressed = decoded.len(), "decompressed");
    parts.headers.remove(header::CONTENT_ENCODING);
    parts.headers.remove(header::CONTENT_LENGTH);

    next.run(rebuild_request(parts, decoded.into())).await
}

fn has_gzip_encoding(req: &Request) -> bool {
    req.headers()
        .get_all(header::CONTENT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.split(',').any(|enc| enc.trim() == "gzip"))
}
