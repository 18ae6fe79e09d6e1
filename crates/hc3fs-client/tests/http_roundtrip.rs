//! HubClient against a one-shot local HTTP responder.

use hc3fs_client::HubClient;
use hc3fs_kernel::HubConfig;
use hc3fs_kernel::hub::{HubApi, HubError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

// ============================================================================
// Shared test setup
// ============================================================================

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn content_length(head: &str) -> usize {
    head.lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

/// Accept one connection, answer with `status` and `body`, and hand back
/// the raw request (lower-cased).
async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/", listener.local_addr().unwrap());
    let task = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = sock.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = find(&buf, b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                if buf.len() >= end + 4 + content_length(&head) {
                    break;
                }
            }
        }
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        sock.write_all(response.as_bytes()).await.unwrap();
        let _ = sock.shutdown().await;
        String::from_utf8_lossy(&buf).to_lowercase()
    });
    (url, task)
}

fn client(url: &str) -> HubClient {
    HubClient::new(&HubConfig::new(url, "admin", "admin")).unwrap()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_list_quick_apps_sends_hub_headers() {
    let (url, server) = serve_once(
        "200 OK",
        r#"[{"id":12,"name":"Lamp","type":"com.fibaro.binarySwitch"}]"#,
    )
    .await;

    let qas = client(&url).list_quick_apps().await.unwrap();
    assert_eq!(qas.len(), 1);
    assert_eq!(qas[0].name, "Lamp");

    let request = server.await.unwrap();
    assert!(request.starts_with("get /api/devices?interface=quickapp http/1.1"));
    assert!(request.contains("authorization: basic ywrtaw46ywrtaw4="));
    assert!(request.contains("x-fibaro-version: 2"));
    assert!(request.contains("content-type: application/json"));
    assert!(request.contains("accept: */*"));
}

#[tokio::test]
async fn test_rename_puts_new_name() {
    let (url, server) = serve_once("200 OK", "").await;

    client(&url)
        .rename_quick_app_file(12, "utils", "helpers")
        .await
        .unwrap();

    let request = server.await.unwrap();
    assert!(request.starts_with("put /api/quickapp/12/files/utils http/1.1"));
    assert!(request.ends_with(r#"{"name":"helpers"}"#));
}

#[tokio::test]
async fn test_file_content_is_taken_from_body() {
    let (url, _server) = serve_once(
        "200 OK",
        r#"{"name":"main","isMain":true,"type":"lua","isOpen":false,"content":"-- hello"}"#,
    )
    .await;

    let content = client(&url).get_quick_app_file_content(12, "main").await.unwrap();
    assert_eq!(content, b"-- hello");
}

#[tokio::test]
async fn test_error_status_is_reported() {
    let (url, _server) = serve_once("404 Not Found", "").await;

    let err = client(&url).get_scene(99).await.unwrap_err();
    assert_eq!(err, HubError::status(404, "Not Found"));
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "404 - Not Found");
}

#[tokio::test]
async fn test_empty_body_for_typed_call() {
    let (url, _server) = serve_once("200 OK", "").await;

    let err = client(&url).get_server_info().await.unwrap_err();
    assert!(matches!(err, HubError::EmptyResponse(_)));
}

#[tokio::test]
async fn test_unreachable_hub_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/", listener.local_addr().unwrap());
    drop(listener);

    let err = client(&url).list_scenes().await.unwrap_err();
    assert!(matches!(err, HubError::Transport(_)));
}
