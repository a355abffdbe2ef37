//! `HttpTransport` behavior against a local mock server.

use execution_guard::{HttpTransport, Transport, TransportError, TransportRequest};
use serde_json::{json, Value};

#[tokio::test]
async fn test_json_response_parsed_and_ok() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"choices":[{"text":"hello"}]}"#)
        .create_async()
        .await;

    let transport = HttpTransport::new().unwrap();
    let request = TransportRequest::post(
        format!("{}/v1/chat", server.url()),
        json!({ "model": "m", "messages": [] }),
    );
    let response = transport.execute(&request).await.unwrap();

    assert!(response.ok);
    assert_eq!(response.status, 200);
    assert_eq!(response.body["choices"][0]["text"], json!("hello"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_error_status_is_delivered_not_ok() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/chat")
        .with_status(503)
        .with_body(r#"{"error":"overloaded"}"#)
        .create_async()
        .await;

    let transport = HttpTransport::new().unwrap();
    let request = TransportRequest::post(format!("{}/v1/chat", server.url()), json!({}));
    let response = transport.execute(&request).await.unwrap();

    assert!(!response.ok);
    assert_eq!(response.status, 503);
    assert_eq!(response.body["error"], json!("overloaded"));
}

#[tokio::test]
async fn test_non_json_body_kept_as_text() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/health")
        .with_status(200)
        .with_body("pong")
        .create_async()
        .await;

    let transport = HttpTransport::new().unwrap();
    let request = TransportRequest::get(format!("{}/health", server.url()));
    let response = transport.execute(&request).await.unwrap();

    assert!(response.ok);
    assert_eq!(response.body, Value::String("pong".into()));
}

#[tokio::test]
async fn test_headers_forwarded() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat")
        .match_header("authorization", "Bearer secret")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let transport = HttpTransport::new().unwrap();
    let request = TransportRequest::post(format!("{}/v1/chat", server.url()), json!({}))
        .with_header("authorization", "Bearer secret");
    transport.execute(&request).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_invalid_url_rejected() {
    let transport = HttpTransport::new().unwrap();
    let request = TransportRequest::get("not a url");
    let err = transport.execute(&request).await.unwrap_err();
    assert!(matches!(err, TransportError::InvalidUrl { .. }));
}
