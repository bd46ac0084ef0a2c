//! HTTP handlers for the metrics surface.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tracing::info;

use pulse_core::{Metric, MetricKind, PulseError};

use crate::state::AppState;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

fn text(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, TEXT_PLAIN)], body).into_response()
}

fn json_message(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "message": message.into() }))).into_response()
}

/// POST /update/{kind}/{name}/{value} — text-form upsert. The kind is
/// matched case-insensitively on this route only.
pub async fn update_url(
    State(state): State<AppState>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> Response {
    match state.service.upsert(&kind, &name, &value).await {
        Ok(()) => {
            info!(kind = %kind, name = %name, value = %value, "metric saved");
            text(StatusCode::OK, String::new())
        }
        Err(err @ PulseError::BadValue { .. }) => {
            info!(%err, "incorrect metric value");
            text(StatusCode::BAD_REQUEST, err.to_string())
        }
        Err(err @ PulseError::UnknownKind { .. }) => {
            info!(%err, "unknown metric type");
            text(StatusCode::BAD_REQUEST, err.to_string())
        }
        Err(err) => {
            info!(%err, "can't save metric");
            text(StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}

/// GET /value/{kind}/{name} — text-form lookup. Misses and unknown
/// kinds both read as absent resources here.
pub async fn value_url(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> Response {
    let kind = kind.to_ascii_lowercase();
    match MetricKind::parse(&kind) {
        Ok(MetricKind::Counter) => match state.service.metric(&kind, &name).await {
            Ok((Some(delta), _)) => text(StatusCode::OK, delta.to_string()),
            _ => text(StatusCode::NOT_FOUND, "not found".to_string()),
        },
        Ok(MetricKind::Gauge) => match state.service.metric(&kind, &name).await {
            Ok((_, Some(value))) => text(StatusCode::OK, format_gauge(value)),
            _ => text(StatusCode::NOT_FOUND, "not found".to_string()),
        },
        Err(err) => {
            info!(%err, "unknown metric type");
            text(StatusCode::NOT_FOUND, "not found".to_string())
        }
    }
}

/// POST /update — single JSON record; echoes the stored value.
pub async fn update_json(State(state): State<AppState>, body: Bytes) -> Response {
    let metric = match decode_metric(&body) {
        Ok(metric) => metric,
        Err(response) => return response,
    };

    match state.service.upsert_typed(&metric).await {
        Ok(stored) => {
            info!(kind = %stored.mtype, name = %stored.id, "metric saved");
            Json(stored).into_response()
        }
        Err(err @ PulseError::EmptyValue { .. }) | Err(err @ PulseError::UnknownKind { .. }) => {
            info!(%err, "invalid metric record");
            json_message(StatusCode::BAD_REQUEST, err.to_string())
        }
        Err(err) => {
            info!(%err, kind = %metric.mtype, name = %metric.id, "can't get updated value");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// POST /updates — batch of JSON records. Elements apply in order; the
/// first invalid one aborts with 400 and earlier elements stay applied.
pub async fn updates_json(State(state): State<AppState>, body: Bytes) -> Response {
    let metrics = match decode_batch(&body) {
        Ok(metrics) => metrics,
        Err(response) => return response,
    };

    for metric in &metrics {
        let missing = metric.missing_fields();
        if !missing.is_empty() {
            return json_message(StatusCode::BAD_REQUEST, missing.join(", "));
        }

        match state.service.upsert_typed(metric).await {
            Ok(_) => {}
            Err(err @ PulseError::EmptyValue { .. })
            | Err(err @ PulseError::UnknownKind { .. }) => {
                info!(%err, "invalid metric record in batch");
                return json_message(StatusCode::BAD_REQUEST, err.to_string());
            }
            Err(err) => {
                info!(%err, "can't save metric from batch");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }
    }

    info!(count = metrics.len(), "batch saved");
    (StatusCode::OK, [(header::CONTENT_TYPE, "application/json")], String::new()).into_response()
}

/// POST /value — single JSON lookup.
pub async fn value_json(State(state): State<AppState>, body: Bytes) -> Response {
    let metric = match decode_metric(&body) {
        Ok(metric) => metric,
        Err(response) => return response,
    };

    match state.service.metric(&metric.mtype, &metric.id).await {
        Ok((delta, value)) => {
            Json(Metric { delta, value, id: metric.id, mtype: metric.mtype }).into_response()
        }
        Err(err @ PulseError::NotFound { .. }) => {
            info!(%err, kind = %metric.mtype, "metric lookup miss");
            json_message(StatusCode::NOT_FOUND, err.to_string())
        }
        Err(err) => {
            info!(%err, "unknown metric type");
            json_message(StatusCode::BAD_REQUEST, err.to_string())
        }
    }
}

/// GET / — HTML dashboard over the current registry contents.
pub async fn webpage(State(state): State<AppState>) -> Response {
    let snapshot = state.service.all_metrics().await;

    let mut rows = String::new();
    for (name, value) in &snapshot.gauge {
        rows.push_str(&format!(
            "<tr><td>gauge</td><td>{}</td><td>{}</td></tr>\n",
            escape(name),
            format_gauge(*value)
        ));
    }
    for (name, delta) in &snapshot.counter {
        rows.push_str(&format!(
            "<tr><td>counter</td><td>{}</td><td>{}</td></tr>\n",
            escape(name),
            delta
        ));
    }

    let page = format!(
        "<!DOCTYPE html>\n<html>\n<head><title>pulse metrics</title></head>\n<body>\n\
         <h1>Metrics</h1>\n<p>rendered at {}</p>\n\
         <table border=\"1\">\n<tr><th>kind</th><th>name</th><th>value</th></tr>\n{}</table>\n\
         </body>\n</html>\n",
        chrono::Local::now().to_rfc2822(),
        rows
    );

    (StatusCode::OK, [(header::CONTENT_TYPE, "text/html; charset=utf-8")], page).into_response()
}

/// GET /ping — persistent backend health probe.
pub async fn ping(State(state): State<AppState>) -> Response {
    match &state.db {
        Some(pool) => match sqlx::query("SELECT 1").execute(pool).await {
            Ok(_) => {
                info!("database ping OK");
                StatusCode::OK.into_response()
            }
            Err(err) => {
                info!(%err, "can't ping database");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        },
        None => {
            info!("database connection string is empty, nothing to ping");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn not_found(uri: axum::http::Uri) -> Response {
    info!(path = %uri.path(), "route not found");
    StatusCode::NOT_FOUND.into_response()
}

/// Decode a single wire record, reporting empty and malformed bodies
/// separately, then validate the always-required fields.
fn decode_metric(body: &Bytes) -> Result<Metric, Response> {
    if body.is_empty() {
        return Err(json_message(StatusCode::BAD_REQUEST, "empty request body"));
    }
    let metric: Metric = serde_json::from_slice(body)
        .map_err(|_| json_message(StatusCode::BAD_REQUEST, "can't parse request body"))?;

    let missing = metric.missing_fields();
    if !missing.is_empty() {
        return Err(json_message(StatusCode::BAD_REQUEST, missing.join(", ")));
    }
    Ok(metric)
}

fn decode_batch(body: &Bytes) -> Result<Vec<Metric>, Response> {
    if body.is_empty() {
        return Err(json_message(StatusCode::BAD_REQUEST, "empty request body"));
    }
    serde_json::from_slice(body)
        .map_err(|_| json_message(StatusCode::BAD_REQUEST, "can't parse request body"))
}

/// Shortest decimal form without an exponent, so `123.456` reads back
/// as `"123.456"` and `42.0` as `"42"`.
fn format_gauge(value: f64) -> String {
    format!("{value}")
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
