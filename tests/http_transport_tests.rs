//! HTTP Transport Tests
//!
//! Runs `HttpTransport` against one-shot HTTP servers on a local socket.

use qcsync::client::send_with_timeout;
use qcsync::store::MemoryStore;
use qcsync::{
    ApiRequest, ClientConfig, Delivery, HttpTransport, Method, OfflineClientBuilder,
    OfflineError, OfflineOptions, RequestConfig, SharedToken, Transport,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

// ============================================================================
// Helpers
// ============================================================================

struct OneShotServer {
    api_url: String,
    /// The raw request as received, lowercased.
    request: JoinHandle<String>,
}

/// Answer exactly one request with `status` and `body` after `delay`.
async fn serve_once(status: &'static str, body: &'static str, delay: Duration) -> OneShotServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let request = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let raw = read_request(&mut socket).await;
        tokio::time::sleep(delay).await;

        let response = format!(
            "HTTP/1.1 {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
        raw
    });

    OneShotServer {
        api_url: format!("http://{}/api/v1", addr),
        request,
    }
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let body_len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_lowercase()
}

fn transport(api_url: &str, token: Option<&str>) -> HttpTransport {
    let tokens = SharedToken::new(token.map(str::to_string));
    HttpTransport::new(api_url, Arc::new(tokens), Duration::from_secs(2)).unwrap()
}

fn post(url: &str, body: Value) -> ApiRequest {
    ApiRequest {
        method: Method::Post,
        url: url.to_string(),
        headers: BTreeMap::new(),
        body: Some(body),
    }
}

fn get(url: &str) -> ApiRequest {
    ApiRequest {
        method: Method::Get,
        url: url.to_string(),
        headers: BTreeMap::new(),
        body: None,
    }
}

// ============================================================================
// Responses
// ============================================================================

#[tokio::test]
async fn test_json_response_and_request_shape() {
    let server = serve_once("201 Created", r#"{"id": 42, "ok_flag": true}"#, Duration::ZERO).await;
    let t = transport(&server.api_url, Some("tok-123"));

    let value = t
        .send(&post("/checklists/7/results", json!({"step_id": 1})))
        .await
        .unwrap();
    assert_eq!(value, json!({"id": 42, "ok_flag": true}));

    let raw = server.request.await.unwrap();
    assert!(raw.starts_with("post /api/v1/checklists/7/results http/1.1"));
    assert!(raw.contains("authorization: bearer tok-123"));
    assert!(raw.contains("content-type: application/json"));
    assert!(raw.ends_with(r#"{"step_id":1}"#));
}

#[tokio::test]
async fn test_error_status_uses_detail_message() {
    let server = serve_once("404 Not Found", r#"{"detail": "Checklist not found"}"#, Duration::ZERO).await;
    let t = transport(&server.api_url, None);

    match t.send(&get("/checklists/99")).await {
        Err(OfflineError::Http { status, message }) => {
            assert_eq!(status, 404);
            assert_eq!(message, "Checklist not found");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_validation_error_joins_messages() {
    let server = serve_once(
        "422 Unprocessable Entity",
        r#"{"detail": [{"msg": "field required"}, {"msg": "value is not a valid integer"}]}"#,
        Duration::ZERO,
    )
    .await;
    let t = transport(&server.api_url, None);

    match t.send(&post("/checklists", json!({}))).await {
        Err(OfflineError::Http { status, message }) => {
            assert_eq!(status, 422);
            assert_eq!(message, "field required; value is not a valid integer");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_success_body_is_null() {
    let server = serve_once("200 OK", "", Duration::ZERO).await;
    let t = transport(&server.api_url, None);

    let value = t.send(&post("/photos/3/delete", json!({}))).await.unwrap();
    assert_eq!(value, Value::Null);
}

#[tokio::test]
async fn test_plain_text_success_body_is_kept() {
    let server = serve_once("200 OK", "accepted", Duration::ZERO).await;
    let t = transport(&server.api_url, None);

    let value = t.send(&get("/status")).await.unwrap();
    assert_eq!(value, Value::String("accepted".to_string()));
}

// ============================================================================
// Health check
// ============================================================================

#[tokio::test]
async fn test_ping_hits_health_on_api_origin() {
    let server = serve_once("200 OK", r#"{"status": "ok"}"#, Duration::ZERO).await;
    let t = transport(&server.api_url, None);

    assert!(t.ping().await);
    let raw = server.request.await.unwrap();
    assert!(raw.starts_with("get /health http/1.1"));
}

#[tokio::test]
async fn test_ping_reports_unhealthy_and_unreachable() {
    let server = serve_once("503 Service Unavailable", "", Duration::ZERO).await;
    assert!(!transport(&server.api_url, None).ping().await);

    // Nothing listens on a port whose listener was dropped
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    assert!(!transport(&format!("http://{}/api/v1", addr), None).ping().await);
}

// ============================================================================
// Deadlines
// ============================================================================

#[tokio::test]
async fn test_per_call_deadline_can_exceed_client_default() {
    let server = serve_once("200 OK", r#"[{"id": 1}]"#, Duration::from_millis(1500)).await;
    let config = ClientConfig {
        api_url: server.api_url.clone(),
        request_timeout_secs: 1,
        auto_sync: false,
        ..ClientConfig::default()
    };
    let client = OfflineClientBuilder::new(config)
        .store(Arc::new(MemoryStore::new()))
        .online(true)
        .build()
        .await
        .unwrap();

    let slow = RequestConfig {
        timeout: Some(Duration::from_secs(5)),
        ..RequestConfig::default()
    };
    let delivery: Delivery<Value> = client
        .send("/checklists", Method::Get, None, Some(slow), OfflineOptions::default())
        .await
        .unwrap();

    assert_eq!(delivery, Delivery::Live(json!([{"id": 1}])));
}

#[tokio::test]
async fn test_slow_server_hits_call_deadline_as_timeout() {
    let server = serve_once("200 OK", "{}", Duration::from_millis(1500)).await;
    let t = transport(&server.api_url, None);

    let result = send_with_timeout(&t, &get("/checklists"), Duration::from_millis(100)).await;
    match result {
        Err(OfflineError::Timeout(after)) => assert_eq!(after, Duration::from_millis(100)),
        other => panic!("unexpected {:?}", other),
    }
}
