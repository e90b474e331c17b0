use fleetlink_sync::{BackendApi, BackendConfig, HttpBackend, SessionAuth, StaticAuth, SyncError};
use fleetlink_types::MutationRequest;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend(server: &MockServer) -> HttpBackend {
    let config = BackendConfig {
        base_url: format!("{}/api/v1", server.uri()),
        request_timeout_ms: 2_000,
    };
    HttpBackend::new(config, Arc::new(SessionAuth::with_token("secret"))).unwrap()
}

// ── Config ──────────────────────────────────────────────────────

#[test]
fn backend_config_default() {
    let cfg = BackendConfig::default();
    assert_eq!(cfg.base_url, "http://localhost:8000/api/v1");
    assert_eq!(cfg.request_timeout_ms, 30_000);
}

#[test]
fn invalid_base_url_is_config_error() {
    let config = BackendConfig {
        base_url: "not a url".into(),
        ..Default::default()
    };
    let err = HttpBackend::new(config, Arc::new(StaticAuth::new(None)))
        .err()
        .unwrap();
    assert!(matches!(err, SyncError::Config(_)));
}

// ── execute / replay ────────────────────────────────────────────

#[tokio::test]
async fn execute_sends_method_body_and_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/v1/work-orders/1"))
        .and(header("authorization", "Bearer secret"))
        .and(body_json(json!({"status": "done"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    backend(&server)
        .execute(&MutationRequest::patch("/work-orders/1", json!({"status": "done"})))
        .await
        .unwrap();
}

#[tokio::test]
async fn execute_delete_without_body() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/parts/7"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    backend(&server)
        .execute(&MutationRequest::delete("/parts/7"))
        .await
        .unwrap();
}

#[tokio::test]
async fn execute_accepts_absolute_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/elsewhere/work-orders"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/elsewhere/work-orders", server.uri());
    backend(&server)
        .execute(&MutationRequest::post(url, json!({"title": "New"})))
        .await
        .unwrap();
}

#[tokio::test]
async fn execute_server_rejection_is_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(409).set_body_string("version conflict"))
        .mount(&server)
        .await;

    let err = backend(&server)
        .execute(&MutationRequest::put("/work-orders/1", json!({})))
        .await
        .unwrap_err();
    match err {
        SyncError::Http { status, body } => {
            assert_eq!(status, 409);
            assert_eq!(body, "version conflict");
        }
        other => panic!("expected Http error, got {other:?}"),
    }
    assert!(!SyncError::Http { status: 409, body: String::new() }.is_transient());
}

#[tokio::test]
async fn execute_slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(5)))
        .mount(&server)
        .await;

    let err = backend(&server)
        .execute(&MutationRequest::post("/work-orders", json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Timeout));
    assert!(err.is_transient());
}

#[tokio::test]
async fn execute_unreachable_is_network_error() {
    let config = BackendConfig {
        base_url: "http://127.0.0.1:9/api/v1".into(),
        request_timeout_ms: 2_000,
    };
    let backend = HttpBackend::new(config, Arc::new(StaticAuth::new(None))).unwrap();
    let err = backend
        .execute(&MutationRequest::post("/work-orders", json!({})))
        .await
        .unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn execute_rejects_bad_method() {
    let server = MockServer::start().await;
    let err = backend(&server)
        .execute(&MutationRequest::new("NOT A METHOD", "/x", json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Protocol(_)));
}

// ── notifications ───────────────────────────────────────────────

#[tokio::test]
async fn fetch_notifications_passes_pagination() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/notifications"))
        .and(query_param("page", "2"))
        .and(query_param("page_size", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"id": "n1", "title": "Oil change due", "is_read": false},
                {"id": "n2", "title": "Low stock", "isRead": true}
            ],
            "total": 12,
            "page": 2,
            "page_size": 5
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = backend(&server).fetch_notifications(2, 5).await.unwrap();
    assert_eq!(page.total, 12);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].id, "n1");
    assert!(page.items[1].is_read);
}

#[tokio::test]
async fn fetch_notifications_accepts_bare_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/notifications"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id": "n1", "title": "Hi"}])),
        )
        .mount(&server)
        .await;

    let page = backend(&server).fetch_notifications(1, 20).await.unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.page, 1);
    assert_eq!(page.page_size, 20);
}

#[tokio::test]
async fn fetch_notifications_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = backend(&server).fetch_notifications(1, 20).await.unwrap_err();
    assert!(matches!(err, SyncError::Http { status: 500, .. }));
}

// ── health ──────────────────────────────────────────────────────

#[tokio::test]
async fn ping_hits_health() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/health"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    backend(&server).ping().await.unwrap();
}
