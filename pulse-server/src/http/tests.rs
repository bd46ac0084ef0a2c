use std::io::Write;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use flate2::write::GzEncoder;
use flate2::Compression;
use tower::ServiceExt;

use pulse_core::crypto::{keys, sign};
use pulse_core::{FileStorage, MetricRegistry, MetricsService, PersistentStorage};

use super::*;

fn bare_state() -> AppState {
    AppState::bare(MetricsService::new(Arc::new(MetricRegistry::new())))
}

async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> Response {
    router.clone().oneshot(request).await.unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_req(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder().method("POST").uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_update_and_read_gauge_via_url() {
    let app = router(bare_state());

    let response = send(&app, post_empty("/update/gauge/owo/123.456")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, get_req("/value/gauge/owo")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "123.456");
}

#[tokio::test]
async fn test_counter_accumulates_via_url() {
    let app = router(bare_state());

    for _ in 0..2 {
        let response = send(&app, post_empty("/update/counter/uwu/123")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = send(&app, get_req("/value/counter/uwu")).await;
    assert_eq!(body_string(response).await, "246");
}

#[tokio::test]
async fn test_url_kind_is_case_insensitive() {
    let app = router(bare_state());

    let response = send(&app, post_empty("/update/GAUGE/owo/1.5")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, get_req("/value/Gauge/owo")).await;
    assert_eq!(body_string(response).await, "1.5");
}

#[tokio::test]
async fn test_update_url_rejects_bad_input() {
    let app = router(bare_state());

    let response = send(&app, post_empty("/update/gauge/owo/12.3a")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_string(response).await, "incorrect metric value \"12.3a\"");

    let response = send(&app, post_empty("/update/histogram/owo/1")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_string(response).await, "unknown metric type \"histogram\"");
}

#[tokio::test]
async fn test_value_url_miss_is_not_found() {
    let app = router(bare_state());

    let response = send(&app, get_req("/value/gauge/missing")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // a name only written as gauge is missing as a counter
    send(&app, post_empty("/update/gauge/owo/1.0")).await;
    let response = send(&app, get_req("/value/counter/owo")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_json_echoes_accumulated_counter() {
    let app = router(bare_state());
    let record = r#"{"delta":1,"id":"test counter","type":"counter"}"#;

    let response = send(&app, post_json("/update", record)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_string(response).await,
        r#"{"delta":1,"id":"test counter","type":"counter"}"#
    );

    let response = send(&app, post_json("/update", record)).await;
    assert_eq!(
        body_string(response).await,
        r#"{"delta":2,"id":"test counter","type":"counter"}"#
    );
}

#[tokio::test]
async fn test_update_json_rejects_bad_bodies() {
    let app = router(bare_state());

    let response = send(&app, post_json("/update", "")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_string(response).await, r#"{"message":"empty request body"}"#);

    let response = send(&app, post_json("/update", "{not json")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_string(response).await, r#"{"message":"can't parse request body"}"#);

    let response = send(&app, post_json("/update", r#"{"value":1.0}"#)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_string(response).await,
        r#"{"message":"field \"type\" is required, field \"id\" is required"}"#
    );

    let response =
        send(&app, post_json("/update", r#"{"id":"owo","type":"gauge"}"#)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_string(response).await,
        r#"{"message":"empty metric value \"gauge\""}"#
    );
}

#[tokio::test]
async fn test_value_json_miss_message() {
    let app = router(bare_state());

    let response =
        send(&app, post_json("/value", r#"{"id":"unknown","type":"counter"}"#)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_string(response).await,
        r#"{"message":"counter metric unknown doesn't exist"}"#
    );
}

#[tokio::test]
async fn test_value_json_returns_stored_gauge() {
    let app = router(bare_state());

    send(&app, post_json("/update", r#"{"value":123.456,"id":"owo","type":"gauge"}"#)).await;
    let response = send(&app, post_json("/value", r#"{"id":"owo","type":"gauge"}"#)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, r#"{"value":123.456,"id":"owo","type":"gauge"}"#);
}

#[tokio::test]
async fn test_updates_batch_applies_all() {
    let app = router(bare_state());
    let batch = r#"[
        {"value":1.5,"id":"Alloc","type":"gauge"},
        {"delta":5,"id":"PollCount","type":"counter"}
    ]"#;

    let response = send(&app, post_json("/updates", batch)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "");

    let response = send(&app, get_req("/value/counter/PollCount")).await;
    assert_eq!(body_string(response).await, "5");
}

#[tokio::test]
async fn test_updates_batch_rejects_unknown_kind() {
    let app = router(bare_state());
    let batch = r#"[
        {"value":1.5,"id":"Alloc","type":"gauge"},
        {"value":2.5,"id":"Bad","type":"abc"}
    ]"#;

    let response = send(&app, post_json("/updates", batch)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_string(response).await, r#"{"message":"unknown metric type \"abc\""}"#);

    // the valid prefix stays applied
    let response = send(&app, get_req("/value/gauge/Alloc")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_ping_without_backend_fails() {
    let app = router(bare_state());
    let response = send(&app, get_req("/ping")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = router(bare_state());
    let response = send(&app, get_req("/nope")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_dashboard_lists_metrics() {
    let app = router(bare_state());
    send(&app, post_empty("/update/gauge/Alloc/1024")).await;

    let response = send(&app, get_req("/")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type =
        response.headers().get(header::CONTENT_TYPE).unwrap().to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/html"));
    assert!(body_string(response).await.contains("Alloc"));
}

fn gzip_bytes(body: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body).unwrap();
    encoder.finish().unwrap()
}

#[tokio::test]
async fn test_gzip_request_body_is_inflated() {
    let app = router(bare_state());
    let body = r#"[{"delta":3,"id":"PollCount","type":"counter"}]"#;

    let request = Request::builder()
        .method("POST")
        .uri("/updates/")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_ENCODING, "gzip")
        .body(Body::from(gzip_bytes(body.as_bytes())))
        .unwrap();

    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, get_req("/value/counter/PollCount")).await;
    assert_eq!(body_string(response).await, "3");
}

#[tokio::test]
async fn test_corrupt_gzip_body_is_rejected() {
    let app = router(bare_state());

    let request = Request::builder()
        .method("POST")
        .uri("/updates/")
        .header(header::CONTENT_ENCODING, "gzip")
        .body(Body::from("definitely not gzip"))
        .unwrap();

    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_string(response).await, r#"{"message":"can't decompress"}"#);
}

fn keyed_state(key: &str) -> AppState {
    let mut state = bare_state();
    state.hash_key = Some(Arc::new(key.as_bytes().to_vec()));
    state
}

#[tokio::test]
async fn test_hash_verification() {
    let app = router(keyed_state("secret"));
    let body = r#"{"delta":1,"id":"c","type":"counter"}"#;
    let digest = sign::sign(body.as_bytes(), b"secret").unwrap();

    // a correctly signed request passes
    let request = Request::builder()
        .method("POST")
        .uri("/update")
        .header(header::CONTENT_TYPE, "application/json")
        .header("HashSHA256", &digest)
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    // a digest computed under another key is rejected
    let bad = sign::sign(body.as_bytes(), b"other").unwrap();
    let request = Request::builder()
        .method("POST")
        .uri("/update")
        .header(header::CONTENT_TYPE, "application/json")
        .header("HashSHA256", &bad)
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_string(response).await, r#"{"message":"can't check hash"}"#);

    // the header is opt-in: no header, no check
    let response = send(&app, post_json("/update", body)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_responses_are_signed_when_keyed() {
    let app = router(keyed_state("secret"));

    let response = send(&app, post_empty("/update/gauge/owo/1.5")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let header =
        response.headers().get("HashSHA256").unwrap().to_str().unwrap().to_string();
    let body = body_string(response).await;
    assert!(sign::verify(body.as_bytes(), b"secret", &header).unwrap());
}

#[tokio::test]
async fn test_trusted_subnet_admission() {
    let mut state = bare_state();
    state.trusted_subnet = Some("10.0.0.0/24".parse().unwrap());
    let app = router(state);

    // inside the subnet
    let request = Request::builder()
        .method("POST")
        .uri("/update/gauge/owo/1.0")
        .header("X-Real-IP", "10.0.0.7")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&app, request).await.status(), StatusCode::OK);

    // outside the subnet
    let request = Request::builder()
        .method("POST")
        .uri("/update/gauge/owo/1.0")
        .header("X-Real-IP", "192.168.0.7")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&app, request).await.status(), StatusCode::FORBIDDEN);

    // no header forwards
    assert_eq!(send(&app, post_empty("/update/gauge/owo/1.0")).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_encrypted_request_body_is_decrypted() {
    let mut rng = rand::thread_rng();
    let private = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
    let public = rsa::RsaPublicKey::from(&private);

    let mut state = bare_state();
    state.private_key = Some(Arc::new(private));
    let app = router(state);

    // the agent encrypts, then compresses
    let body = r#"[{"delta":7,"id":"PollCount","type":"counter"}]"#;
    let encrypted = keys::encrypt(&public, body.as_bytes()).unwrap();
    let compressed = gzip_bytes(&encrypted);

    let request = Request::builder()
        .method("POST")
        .uri("/updates/")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_ENCODING, "gzip")
        .body(Body::from(compressed))
        .unwrap();

    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, get_req("/value/counter/PollCount")).await;
    assert_eq!(body_string(response).await, "7");
}

#[tokio::test]
async fn test_sync_mode_saves_after_update() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics-db.json");

    let registry = Arc::new(MetricRegistry::new());
    let storage: Arc<dyn PersistentStorage> =
        Arc::new(FileStorage::new(&path, registry.clone()));

    let mut state = AppState::bare(MetricsService::new(registry));
    state.storage = Some(storage);
    state.sync_save = true;
    let app = router(state);

    let response = send(&app, post_empty("/update/counter/uwu/5")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let saved = std::fs::read_to_string(&path).unwrap();
    assert!(saved.contains("\"uwu\":5"));
}

