//! Synchronous write-back stage.

use axum::extract::{Request, State};
use axum::http::{header, Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{error, info};

use crate::snapshot;
use crate::state::AppState;

/// In synchronous mode (store-interval 0), persist the registry after
/// every successful mutating response. Save failures are logged and
/// never alter the response.
pub async fn save(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let (sync_save, storage) = (state.sync_save, state.storage.clone());
    let method = req.method().clone();

    let response = next.run(req).await;

    let storage = match storage {
        Some(storage) if sync_save => storage,
        _ => return response,
    };

    if method == Method::POST && response.status() == StatusCode::OK && is_saved_content(&response)
    {
        match snapshot::save_with_retry(&storage).await {
            Ok(()) => info!("all metrics saved successfully"),
            Err(err) => error!(%err, "can't save metrics"),
        }
    }

    response
}

fn is_saved_content(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("text/plain") || ct.contains("application/json"))
        .unwrap_or(false)
}
