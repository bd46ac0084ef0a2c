//! Trusted-subnet admission stage.

use std::net::IpAddr;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, warn};

use crate::state::AppState;

use super::error_json;

/// Check the `X-Real-IP` header against the configured CIDR. A missing
/// or unparsable header forwards; an address outside the subnet is
/// rejected with 403.
pub async fn check(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(subnet) = state.trusted_subnet else {
        return next.run(req).await;
    };

    let real_ip = req
        .headers()
        .get("X-Real-IP")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<IpAddr>().ok());

    match real_ip {
        None => {
            debug!("X-Real-IP header is empty or invalid, skip check");
            next.run(req).await
        }
        Some(ip) if subnet.contains(ip) => {
            debug!(%ip, "ip address check OK");
            next.run(req).await
        }
        Some(ip) => {
            warn!(%ip, "ip address is not in trusted subnet");
            error_json(StatusCode::FORBIDDEN, "ip address is not in trusted subnet")
        }
    }
}
