//! Integration tests for `HttpDetector` against a fake detection service.

#![cfg(feature = "http")]

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use typesecure_detect::{DetectError, Detector, DetectorConfig, HttpDetector};
use typesecure_protocol::DetectionRequest;

// =========================================================================
// Fake service
// =========================================================================

/// What the fake service saw.
struct Captured {
    request_line: String,
    body: String,
}

/// Serves exactly one HTTP request with `status` and `body`, and
/// reports what it received.
async fn serve_once(
    status: u16,
    body: &'static str,
) -> (HttpDetector, oneshot::Receiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        // Read headers, then exactly Content-Length body bytes.
        let header_end = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = find(&buf, b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let content_length = head
            .lines()
            .find_map(|l| {
                let (name, value) = l.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())?
            })
            .unwrap_or(0);
        while buf.len() < header_end + content_length {
            let n = stream.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
        }

        let response = format!(
            "HTTP/1.1 {status} Fake\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.unwrap();

        let _ = tx.send(Captured {
            request_line: head.lines().next().unwrap_or_default().to_string(),
            body: String::from_utf8_lossy(&buf[header_end..]).to_string(),
        });
    });

    let detector = HttpDetector::new(&DetectorConfig {
        base_url: format!("http://{addr}"),
        ..DetectorConfig::default()
    })
    .unwrap();
    (detector, rx)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

const SENSITIVE: &str = r#"{"is_sensitive":true,"confidence":0.93,"detected_types":["email"],"processed_text":"contact [EMAIL]"}"#;

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_detect_text_posts_payload_and_decodes_result() {
    let (detector, seen) = serve_once(200, SENSITIVE).await;

    let result = detector
        .detect(&DetectionRequest::Text("contact ada@example.com".into()))
        .await
        .unwrap();

    assert!(result.is_sensitive);
    assert_eq!(result.detected_types, vec!["email".to_string()]);
    assert_eq!(result.processed_text, "contact [EMAIL]");

    let seen = seen.await.unwrap();
    assert_eq!(seen.request_line, "POST /api/detect HTTP/1.1");
    let payload: serde_json::Value = serde_json::from_str(&seen.body).unwrap();
    assert_eq!(payload, serde_json::json!({"text": "contact ada@example.com"}));
}

#[tokio::test]
async fn test_detect_file_sends_contents_and_labels_result() {
    let (detector, seen) = serve_once(200, SENSITIVE).await;

    let result = detector
        .detect(&DetectionRequest::File {
            name: "notes.txt".into(),
            contents: b"ssn 123-45-6789".to_vec(),
        })
        .await
        .unwrap();

    assert_eq!(result.processed_text, "File: notes.txt");
    let seen = seen.await.unwrap();
    assert!(seen.body.contains("ssn 123-45-6789"));
}

#[tokio::test]
async fn test_detect_non_success_is_rejected_with_body() {
    let (detector, _) = serve_once(400, "text is required").await;

    let err = detector
        .detect(&DetectionRequest::Text(String::new()))
        .await
        .unwrap_err();

    match err {
        DetectError::Rejected { status, body } => {
            assert_eq!(status, 400);
            assert_eq!(body, "text is required");
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_detect_garbage_body_is_protocol_error() {
    let (detector, _) = serve_once(200, "<html>oops</html>").await;

    let err = detector
        .detect(&DetectionRequest::Text("hello".into()))
        .await
        .unwrap_err();

    assert!(matches!(err, DetectError::Protocol(_)));
}

#[tokio::test]
async fn test_detect_out_of_range_confidence_is_clamped() {
    let (detector, _) = serve_once(
        200,
        r#"{"is_sensitive":true,"confidence":1.7,"detected_types":[],"processed_text":""}"#,
    )
    .await;

    let result = detector
        .detect(&DetectionRequest::Text("hello".into()))
        .await
        .unwrap();

    assert_eq!(result.confidence, 1.0);
}

#[tokio::test]
async fn test_detect_unreachable_service_is_unavailable() {
    // Grab a free port, then close it so nothing is listening.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let detector = HttpDetector::new(&DetectorConfig {
        base_url: format!("http://{addr}"),
        ..DetectorConfig::default()
    })
    .unwrap();

    let err = detector
        .detect(&DetectionRequest::Text("hello".into()))
        .await
        .unwrap_err();

    assert!(matches!(err, DetectError::Unavailable(_)));
}
